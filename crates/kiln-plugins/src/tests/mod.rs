//! End-to-end scenarios across resolution, installation, and discovery.

use std::collections::BTreeSet;
use std::fs;

use rstest::{fixture, rstest};

use crate::discovery::discover;
use crate::error::PluginError;
use crate::installer::Installer;
use crate::platform::Platform;
use crate::test_support::{PluginRoot, StaticReleases, artifact};
use crate::{SourceAddress, VersionRequirement};

const PLATFORMS: [(&str, &str); 3] = [("darwin", "arm64"), ("linux", "amd64"), ("windows", "amd64")];

#[fixture]
fn comment() -> SourceAddress {
    SourceAddress::parse("github.com/sylviamoss/comment").expect("address")
}

fn linux() -> Platform {
    Platform::new("linux", "amd64")
}

fn requirement(raw: &str) -> VersionRequirement {
    VersionRequirement::parse(raw).expect("requirement")
}

/// A root holding v0.2.19 for three platforms: six files in total.
#[fixture]
fn populated(comment: SourceAddress) -> PluginRoot {
    let root = PluginRoot::new();
    for (os, arch) in PLATFORMS {
        root.install_fake(&comment, &artifact("comment", "0.2.19", os, arch), b"v0.2.19");
    }
    root
}

#[rstest]
fn already_installed_plugin_is_not_fetched_again(populated: PluginRoot, comment: SourceAddress) {
    let files = populated.files();
    assert_eq!(files.len(), 6);
    let before = populated.hash();

    let source = StaticReleases::new().with_platforms("comment", "0.2.19", &PLATFORMS, b"v0.2.19");
    let installed = Installer::new(populated.path())
        .install_from_source(&comment, &requirement(">= 0.2.0"), &source, &linux())
        .expect("install");

    assert_eq!(installed.version().to_string(), "0.2.19");
    assert!(source.fetched().is_empty());
    assert_eq!(populated.files(), files);
    assert_eq!(populated.hash(), before);
}

#[rstest]
fn upgrade_adds_exactly_one_binary_and_sidecar(populated: PluginRoot, comment: SourceAddress) {
    let before: BTreeSet<String> = populated.files().into_iter().collect();
    let source = StaticReleases::new()
        .with_platforms("comment", "0.2.19", &PLATFORMS, b"v0.2.19")
        .with_platforms("comment", "0.2.20", &PLATFORMS, b"v0.2.20");

    Installer::new(populated.path())
        .install_from_source(&comment, &VersionRequirement::Latest, &source, &linux())
        .expect("install");

    let after: BTreeSet<String> = populated.files().into_iter().collect();
    let added: Vec<&String> = after.difference(&before).collect();
    assert_eq!(
        added,
        [
            "github.com/sylviamoss/comment/kiln-plugin-comment_v0.2.20_x5.0_linux_amd64",
            "github.com/sylviamoss/comment/kiln-plugin-comment_v0.2.20_x5.0_linux_amd64_SHA256SUM",
        ]
    );
    assert!(before.is_subset(&after));

    let registry = discover([populated.path()]);
    let latest = registry
        .latest(&comment, &VersionRequirement::Latest, &linux())
        .expect("latest");
    assert_eq!(latest.version().to_string(), "0.2.20");
    assert_eq!(registry.installed(&comment).len(), 4);
}

#[rstest]
fn no_compatible_release_leaves_root_untouched(populated: PluginRoot, comment: SourceAddress) {
    let before = populated.hash();
    let source = StaticReleases::new().with_platforms("comment", "0.2.19", &PLATFORMS, b"v0.2.19");

    let error = Installer::new(populated.path())
        .install_from_source(&comment, &requirement(">= 1.0.0"), &source, &linux())
        .expect_err("nothing matches");

    assert!(matches!(error, PluginError::NoCompatibleRelease { .. }));
    assert!(source.fetched().is_empty());
    assert_eq!(populated.hash(), before);
}

#[rstest]
fn tampered_binary_is_reported_and_left_alone(populated: PluginRoot, comment: SourceAddress) {
    let path = populated.binary_path(&comment, &artifact("comment", "0.2.19", "linux", "amd64"));
    fs::write(&path, b"evil").expect("tamper");
    let before = populated.hash();
    let source = StaticReleases::new().with_platforms("comment", "0.2.19", &PLATFORMS, b"v0.2.19");

    let error = Installer::new(populated.path())
        .install_from_source(&comment, &requirement("0.2.19"), &source, &linux())
        .expect_err("tampered");

    assert!(matches!(error, PluginError::ChecksumMismatch { .. }));
    assert_eq!(fs::read(&path).expect("binary"), b"evil");
    assert_eq!(populated.hash(), before);

    // Discovery refuses the tampered copy too.
    let registry = discover([populated.path()]);
    assert_eq!(registry.installed(&comment).len(), 2);
    assert!(
        registry
            .latest(&comment, &VersionRequirement::Latest, &linux())
            .is_none()
    );
}

#[rstest]
#[case("gitlab.com/sylviamoss/comment")]
#[case("example.com/sylviamoss/comment")]
fn unsupported_host_is_rejected_before_touching_disk(#[case] raw: &str) {
    let root = PluginRoot::new();
    let error = SourceAddress::parse(raw).expect_err("unsupported");
    assert!(matches!(error, PluginError::UnsupportedHost { .. }));
    assert!(root.files().is_empty());
}

#[rstest]
fn second_install_performs_no_writes(comment: SourceAddress) {
    let root = PluginRoot::new();
    let source = StaticReleases::new().with_platforms("comment", "0.2.19", &PLATFORMS, b"v0.2.19");
    let installer = Installer::new(root.path());

    let first = installer
        .install_from_source(&comment, &VersionRequirement::Latest, &source, &linux())
        .expect("first install");
    let hash = root.hash();
    let modified = fs::metadata(first.path())
        .and_then(|meta| meta.modified())
        .expect("mtime");

    let second = installer
        .install_from_source(&comment, &VersionRequirement::Latest, &source, &linux())
        .expect("second install");

    assert_eq!(first, second);
    assert_eq!(root.hash(), hash);
    assert_eq!(
        fs::metadata(second.path())
            .and_then(|meta| meta.modified())
            .expect("mtime"),
        modified
    );
    assert_eq!(source.fetched().len(), 1);
}

#[rstest]
fn versions_coexist_and_registry_prefers_newest(comment: SourceAddress) {
    let root = PluginRoot::new();
    let installer = Installer::new(root.path());
    let source = StaticReleases::new()
        .with(artifact("comment", "1.0.0", "linux", "amd64"), b"one")
        .with(artifact("comment", "2.0.0", "linux", "amd64"), b"two");

    installer
        .install_from_source(&comment, &requirement("1.0.0"), &source, &linux())
        .expect("v1");
    installer
        .install_from_source(&comment, &requirement("2.0.0"), &source, &linux())
        .expect("v2");

    let registry = discover([root.path()]);
    let versions: Vec<String> = registry
        .installed(&comment)
        .iter()
        .map(|plugin| plugin.version().to_string())
        .collect();
    assert_eq!(versions, ["2.0.0", "1.0.0"]);
    assert_eq!(
        registry
            .latest(&comment, &requirement("< 2.0.0"), &linux())
            .map(|plugin| plugin.version().to_string()),
        Some(String::from("1.0.0"))
    );
}
