//! Unit tests for release selection.

use rstest::{fixture, rstest};

use super::*;
use crate::version::{HOST_API_VERSION, parse_version};

fn release(version: &str, os: &str, arch: &str, api: ApiVersion) -> PluginRelease {
    let artifact = ArtifactName::new(
        "comment",
        parse_version(version).expect("version"),
        api,
        Platform::new(os, arch),
    );
    let checksum = Checksum::of_bytes(artifact.filename().as_bytes());
    PluginRelease::new(artifact, 1, checksum)
}

fn x50(version: &str, os: &str) -> PluginRelease {
    release(version, os, "amd64", ApiVersion::new(5, 0))
}

#[fixture]
fn address() -> SourceAddress {
    SourceAddress::parse("github.com/sylviamoss/comment").expect("address")
}

#[fixture]
fn catalog() -> Vec<PluginRelease> {
    vec![
        x50("0.2.18", "linux"),
        x50("0.2.18", "darwin"),
        x50("0.2.18", "windows"),
        x50("0.2.19", "linux"),
        x50("0.2.19", "darwin"),
        x50("0.2.19", "windows"),
        // Only published for darwin.
        x50("0.3.0", "darwin"),
        x50("0.4.0-rc.1", "linux"),
        release("0.5.0", "linux", "amd64", ApiVersion::new(6, 0)),
    ]
}

fn select(
    address: &SourceAddress,
    catalog: &[PluginRelease],
    requirement: &str,
    os: &str,
) -> Result<String, PluginError> {
    let requirement = VersionRequirement::parse(requirement).expect("requirement");
    select_release(
        address,
        &requirement,
        catalog,
        &Platform::new(os, "amd64"),
        HOST_API_VERSION,
    )
    .map(|chosen| chosen.version().to_string())
}

#[rstest]
#[case::exact("v0.2.18", "linux", "0.2.18")]
#[case::range(">= 0.2.0, < 0.3.0", "linux", "0.2.19")]
#[case::latest_skips_prerelease("latest", "linux", "0.2.19")]
#[case::latest_on_darwin("latest", "darwin", "0.3.0")]
#[case::pessimistic("~> 0.2.0", "windows", "0.2.19")]
#[case::exact_prerelease("v0.4.0-rc.1", "linux", "0.4.0-rc.1")]
fn selects_highest_matching_version(
    address: SourceAddress,
    catalog: Vec<PluginRelease>,
    #[case] requirement: &str,
    #[case] os: &str,
    #[case] expected: &str,
) {
    let chosen = select(&address, &catalog, requirement, os).expect("release should be selected");
    assert_eq!(chosen, expected);
}

#[rstest]
#[case::other_platform_only("v0.3.0", "linux")]
#[case::unknown_version("v9.9.9", "linux")]
#[case::incompatible_api("v0.5.0", "linux")]
#[case::unknown_platform("latest", "plan9")]
fn reports_no_compatible_release(
    address: SourceAddress,
    catalog: Vec<PluginRelease>,
    #[case] requirement: &str,
    #[case] os: &str,
) {
    let error = select(&address, &catalog, requirement, os).expect_err("nothing should match");
    match error {
        PluginError::NoCompatibleRelease {
            address: reported,
            requirement: reported_requirement,
            platform,
        } => {
            assert_eq!(reported, "github.com/sylviamoss/comment");
            assert!(!reported_requirement.is_empty());
            assert_eq!(platform, format!("{os}_amd64"));
        }
        other => panic!("expected NoCompatibleRelease, got {other}"),
    }
}

#[rstest]
fn latest_falls_back_to_prerelease_when_nothing_is_stable(address: SourceAddress) {
    let catalog = vec![x50("1.0.0-beta.1", "linux"), x50("1.0.0-beta.2", "linux")];
    let chosen = select(&address, &catalog, "latest", "linux").expect("prerelease fallback");
    assert_eq!(chosen, "1.0.0-beta.2");
}

#[rstest]
fn older_api_minor_is_compatible(address: SourceAddress) {
    let requirement = VersionRequirement::Latest;
    let catalog = vec![release("1.0.0", "linux", "amd64", ApiVersion::new(5, 0))];
    let chosen = select_release(
        &address,
        &requirement,
        &catalog,
        &Platform::new("linux", "amd64"),
        ApiVersion::new(5, 2),
    )
    .expect("x5.0 loads on x5.2");
    assert_eq!(chosen.api(), ApiVersion::new(5, 0));
}

#[test]
fn download_url_is_optional() {
    let bare = x50("1.0.0", "linux");
    assert_eq!(bare.download_url(), None);
    let located = bare.with_download_url("https://example.invalid/asset");
    assert_eq!(located.download_url(), Some("https://example.invalid/asset"));
}

#[rstest]
fn releases_of_other_plugins_are_ignored(address: SourceAddress) {
    let foreign = |version: &str| {
        let artifact = ArtifactName::new(
            "other",
            parse_version(version).expect("version"),
            HOST_API_VERSION,
            Platform::new("linux", "amd64"),
        );
        PluginRelease::new(artifact, 1, Checksum::of_bytes(b"other"))
    };

    let error = select(&address, &[foreign("1.0.0")], "latest", "linux")
        .expect_err("foreign release only");
    assert!(matches!(error, PluginError::NoCompatibleRelease { .. }), "{error}");

    let catalog = vec![foreign("9.0.0"), x50("0.2.19", "linux")];
    let chosen = select(&address, &catalog, "latest", "linux").expect("own release");
    assert_eq!(chosen, "0.2.19");
}
