//! Unit tests for the artifact filename grammar.

use rstest::rstest;

use super::*;

#[rstest]
#[case("kiln-plugin-comment_v0.2.18_x5.0_darwin_amd64", "comment", "0.2.18", "darwin", "amd64")]
#[case("kiln-plugin-comment_v0.2.18_x5.0_linux_amd64", "comment", "0.2.18", "linux", "amd64")]
#[case(
    "kiln-plugin-comment_v0.2.18_x5.0_windows_amd64.exe",
    "comment",
    "0.2.18",
    "windows",
    "amd64"
)]
#[case(
    "kiln-plugin-amazon_ebs_v1.0.0-rc.1_x5.0_linux_arm64",
    "amazon_ebs",
    "1.0.0-rc.1",
    "linux",
    "arm64"
)]
fn parses_artifact_names(
    #[case] filename: &str,
    #[case] plugin: &str,
    #[case] version: &str,
    #[case] os: &str,
    #[case] arch: &str,
) {
    let name = ArtifactName::parse(filename).expect("filename should parse");
    assert_eq!(name.plugin(), plugin);
    assert_eq!(name.version().to_string(), version);
    assert_eq!(name.api(), ApiVersion::new(5, 0));
    assert_eq!(name.platform(), &Platform::new(os, arch));
    assert_eq!(name.filename(), filename, "encoding must reproduce the input");
}

#[rstest]
#[case::sidecar("kiln-plugin-comment_v0.2.18_x5.0_linux_amd64_SHA256SUM")]
#[case::no_prefix("comment_v0.2.18_x5.0_linux_amd64")]
#[case::foreign_prefix("packer-plugin-comment_v0.2.18_x5.0_linux_amd64")]
#[case::no_v("kiln-plugin-comment_0.2.18_x5.0_linux_amd64")]
#[case::no_x("kiln-plugin-comment_v0.2.18_5.0_linux_amd64")]
#[case::partial_version("kiln-plugin-comment_v0.2_x5.0_linux_amd64")]
#[case::missing_arch("kiln-plugin-comment_v0.2.18_x5.0_linux")]
#[case::exe_on_linux("kiln-plugin-comment_v0.2.18_x5.0_linux_amd64.exe")]
#[case::windows_without_exe("kiln-plugin-comment_v0.2.18_x5.0_windows_amd64")]
#[case::upper_case("kiln-plugin-Comment_v0.2.18_x5.0_linux_amd64")]
#[case::empty("")]
fn rejects_non_artifacts(#[case] filename: &str) {
    assert!(
        ArtifactName::parse(filename).is_none(),
        "{filename} should not parse"
    );
}

#[test]
fn sidecar_filename_appends_suffix() {
    let name = ArtifactName::new(
        "comment",
        semver::Version::new(0, 2, 19),
        ApiVersion::new(5, 0),
        Platform::new("windows", "amd64"),
    );
    assert_eq!(
        name.sidecar_filename(),
        "kiln-plugin-comment_v0.2.19_x5.0_windows_amd64.exe_SHA256SUM"
    );
}
