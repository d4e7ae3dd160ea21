//! Unit tests for the GitHub release source.

use mockall::mock;
use mockall::predicate::eq;
use rstest::{fixture, rstest};

use super::*;
use crate::platform::Platform;

mock! {
    Http {}
    impl Fetcher for Http {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, PluginError>;
    }
}

const API: &str = "https://api.test";
const LISTING_URL: &str = "https://api.test/repos/sylviamoss/kiln-plugin-comment/releases";
const SUMS_URL: &str = "https://dl.test/v0.2.19/kiln-plugin-comment_v0.2.19_SHA256SUMS";
const LINUX: &str = "kiln-plugin-comment_v0.2.19_x5.0_linux_amd64";
const WINDOWS: &str = "kiln-plugin-comment_v0.2.19_x5.0_windows_amd64.exe";

#[fixture]
fn address() -> SourceAddress {
    SourceAddress::parse("github.com/sylviamoss/comment").expect("address")
}

fn listing() -> Vec<u8> {
    serde_json::json!([
        {
            "tag_name": "v0.2.19",
            "draft": false,
            "assets": [
                { "name": "kiln-plugin-comment_v0.2.19_SHA256SUMS", "size": 10,
                  "browser_download_url": SUMS_URL },
                { "name": LINUX, "size": 1,
                  "browser_download_url": format!("https://dl.test/v0.2.19/{LINUX}") },
                { "name": WINDOWS, "size": 5,
                  "browser_download_url": format!("https://dl.test/v0.2.19/{WINDOWS}") },
                { "name": "kiln-plugin-comment_v0.2.19_x5.0_darwin_amd64", "size": 1,
                  "browser_download_url": "https://dl.test/v0.2.19/unsummed" },
                { "name": "README.md", "size": 1,
                  "browser_download_url": "https://dl.test/v0.2.19/README.md" }
            ]
        },
        {
            "tag_name": "v0.3.0",
            "draft": true,
            "assets": []
        },
        {
            "tag_name": "nightly",
            "assets": []
        }
    ])
    .to_string()
    .into_bytes()
}

fn sums() -> Vec<u8> {
    format!(
        "{}  {LINUX}\n{} *{WINDOWS}\n\n",
        Checksum::of_bytes(b"1"),
        Checksum::of_bytes(b"1.exe")
    )
    .into_bytes()
}

fn fetcher_with_catalog() -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_fetch()
        .with(eq(LISTING_URL))
        .times(1)
        .returning(|_| Ok(listing()));
    http.expect_fetch()
        .with(eq(SUMS_URL))
        .times(1)
        .returning(|_| Ok(sums()));
    http
}

#[rstest]
fn lists_summed_artifacts_of_published_releases(address: SourceAddress) {
    let source = GithubReleases::new(fetcher_with_catalog()).with_api_base(format!("{API}/"));
    let releases = source.list_releases(&address).expect("listing");

    let names: Vec<String> = releases.iter().map(PluginRelease::filename).collect();
    assert_eq!(names, [LINUX, WINDOWS]);

    let linux = releases.first().expect("linux release");
    assert_eq!(linux.platform(), &Platform::new("linux", "amd64"));
    assert_eq!(linux.checksum(), Checksum::of_bytes(b"1"));
    assert_eq!(linux.size(), 1);
    assert_eq!(
        linux.download_url(),
        Some(format!("https://dl.test/v0.2.19/{LINUX}").as_str())
    );
    let windows = releases.get(1).expect("windows release");
    assert_eq!(windows.checksum(), Checksum::of_bytes(b"1.exe"));
}

#[rstest]
fn fetch_uses_the_download_url(address: SourceAddress) {
    let mut http = fetcher_with_catalog();
    let artifact_url = format!("https://dl.test/v0.2.19/{LINUX}");
    http.expect_fetch()
        .with(eq(artifact_url))
        .times(1)
        .returning(|_| Ok(b"1".to_vec()));
    let source = GithubReleases::new(http).with_api_base(API);
    let releases = source.list_releases(&address).expect("listing");
    let linux = releases.first().expect("linux release");
    assert_eq!(source.fetch(linux).expect("fetch"), b"1");
}

#[rstest]
fn malformed_listing_is_an_invalid_catalog(address: SourceAddress) {
    let mut http = MockHttp::new();
    http.expect_fetch().returning(|_| Ok(b"{\"message\":\"Not Found\"}".to_vec()));
    let source = GithubReleases::new(http).with_api_base(API);
    let error = source.list_releases(&address).expect_err("not a listing");
    assert!(matches!(error, PluginError::InvalidReleaseCatalog { .. }), "{error}");
}

#[rstest]
fn malformed_sums_line_is_an_invalid_catalog(address: SourceAddress) {
    let mut http = MockHttp::new();
    http.expect_fetch()
        .with(eq(LISTING_URL))
        .returning(|_| Ok(listing()));
    http.expect_fetch()
        .with(eq(SUMS_URL))
        .returning(|_| Ok(b"deadbeef  kiln-plugin-comment".to_vec()));
    let source = GithubReleases::new(http).with_api_base(API);
    let error = source.list_releases(&address).expect_err("bad sums");
    assert!(error.to_string().contains("malformed line"), "{error}");
}

#[rstest]
fn fetch_errors_propagate(address: SourceAddress) {
    let mut http = MockHttp::new();
    http.expect_fetch().returning(|url| {
        Err(PluginError::Fetch {
            url: url.to_owned(),
            message: String::from("connection refused"),
        })
    });
    let source = GithubReleases::new(http).with_api_base(API);
    let error = source.list_releases(&address).expect_err("offline");
    assert!(matches!(error, PluginError::Fetch { .. }));
}

#[test]
fn release_without_url_cannot_be_fetched() {
    let artifact = ArtifactName::parse(LINUX).expect("artifact");
    let release = PluginRelease::new(artifact, 1, Checksum::of_bytes(b"1"));
    let source = GithubReleases::new(MockHttp::new());
    let error = source.fetch(&release).expect_err("no url");
    assert!(matches!(error, PluginError::Fetch { .. }));
}
