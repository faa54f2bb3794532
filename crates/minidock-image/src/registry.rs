//! Registry HTTP API v2 client.
//!
//! Downloads an image into the legacy `docker save` layout the store
//! installs from: `<hash>.json`, one `<digest>.tar` per layer, and a
//! single-entry `manifest.json`. Anonymous bearer tokens are requested on
//! demand when the registry answers `401`. Multi-platform indexes resolve
//! to the `linux/<host arch>` manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use minidock_common::config::create_dir_all;
use minidock_common::constants::{APP_NAME, MANIFEST_FILE};
use minidock_common::error::{MinidockError, Result};
use minidock_common::types::ImageHash;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::fetcher::{FetchedImage, ImageFetcher};
use crate::hash::{HashingWriter, digest_hex, verify_digest};
use crate::manifest::{ManifestEntry, write_manifest};
use crate::reference::ImageReference;

const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
const DOCKER_HUB_ALIASES: [&str; 2] = ["docker.io", "index.docker.io"];
const OFFICIAL_NAMESPACE: &str = "library";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.v2+json";

/// A repository on a specific registry host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Registry host, with an optional port.
    pub registry: String,
    /// Repository path on that registry.
    pub path: String,
}

impl Repository {
    /// Splits an image name into registry host and repository path.
    ///
    /// The first component names a host when it contains `.` or `:` or is
    /// `localhost`; otherwise Docker Hub is assumed, and single-component
    /// names live under `library/`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let (registry, path) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB_REGISTRY.to_string(), name.to_string()),
        };
        let registry = if DOCKER_HUB_ALIASES.contains(&registry.as_str()) {
            DOCKER_HUB_REGISTRY.to_string()
        } else {
            registry
        };
        let path = if registry == DOCKER_HUB_REGISTRY && !path.contains('/') {
            format!("{OFFICIAL_NAMESPACE}/{path}")
        } else {
            path
        };
        Self { registry, path }
    }

    /// Base URL of the registry API. Loopback registries use plain HTTP.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.registry.split(':').next().unwrap_or_default();
        let scheme = if host == "localhost" || host == "127.0.0.1" {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}/v2/{}", self.registry, self.path)
    }
}

/// Parameters of a `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Token endpoint.
    pub realm: String,
    /// Service the token is issued for.
    pub service: Option<String>,
    /// Requested scope.
    pub scope: Option<String>,
}

/// Parses a `Bearer` challenge. Quoted values may contain commas.
#[must_use]
pub fn parse_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut challenge = BearerChallenge::default();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let key = key.trim().trim_start_matches(',').trim();
        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            let end = after_key.find(',').unwrap_or(after_key.len());
            (&after_key[..end], &after_key[end..])
        };
        match key.to_ascii_lowercase().as_str() {
            "realm" => challenge.realm = value.to_string(),
            "service" => challenge.service = Some(value.to_string()),
            "scope" => challenge.scope = Some(value.to_string()),
            _ => {}
        }
        rest = remainder.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    (!challenge.realm.is_empty()).then_some(challenge)
}

/// Registry architecture name for a Rust target architecture.
#[must_use]
pub fn oci_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    manifests: Option<Vec<PlatformDescriptor>>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct PlatformDescriptor {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Picks the `linux/<arch>` entry of an index.
///
/// The error message lists the platforms the index does provide.
fn select_platform<'a>(
    manifests: &'a [PlatformDescriptor],
    arch: &str,
) -> std::result::Result<&'a PlatformDescriptor, String> {
    manifests
        .iter()
        .find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|p| p.os == "linux" && p.architecture == arch)
        })
        .ok_or_else(|| {
            let available: Vec<String> = manifests
                .iter()
                .filter_map(|m| m.platform.as_ref())
                .map(|p| format!("{}/{}", p.os, p.architecture))
                .collect();
            format!(
                "no manifest for linux/{arch}; available platforms: {}",
                available.join(", ")
            )
        })
}

/// [`ImageFetcher`] that pulls from a registry over HTTPS.
///
/// The HTTP client is built per pull, so constructing a fetcher is free.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryFetcher;

impl RegistryFetcher {
    fn client() -> Result<Client> {
        Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| MinidockError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}

impl ImageFetcher for RegistryFetcher {
    fn fetch(&self, reference: &ImageReference, scratch: &Path) -> Result<FetchedImage> {
        let client = Self::client()?;
        let mut session = Session {
            client: &client,
            repository: Repository::from_name(&reference.name),
            reference: reference.to_string(),
            token: None,
        };
        tracing::debug!(
            registry = %session.repository.registry,
            repository = %session.repository.path,
            "resolving manifest"
        );

        let mut manifest = session.manifest(&reference.tag)?;
        if let Some(entries) = manifest.manifests.take() {
            let arch = oci_arch(std::env::consts::ARCH);
            let selected = select_platform(&entries, arch).map_err(|m| session.error(m))?;
            tracing::debug!(digest = %selected.digest, arch, "selected platform manifest");
            manifest = session.manifest(&selected.digest)?;
        }

        let config = manifest
            .config
            .as_ref()
            .ok_or_else(|| session.error("manifest has no config descriptor".into()))?;
        if manifest.layers.is_empty() {
            return Err(session.error("manifest lists no layers".into()));
        }
        let hash = digest_hex(&config.digest)?.to_string();

        let dir = scratch.join(&hash);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| MinidockError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        create_dir_all(&dir)?;

        let config_file = format!("{hash}.json");
        session.download_blob(&config.digest, &dir.join(&config_file))?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            let file = format!("{}.tar", digest_hex(&layer.digest)?);
            tracing::info!(image = %reference, layer = %layer.digest, "downloading layer");
            session.download_blob(&layer.digest, &dir.join(&file))?;
            layers.push(file);
        }

        write_manifest(
            &dir.join(MANIFEST_FILE),
            &ManifestEntry {
                config: config_file,
                repo_tags: vec![reference.to_string()],
                layers,
            },
        )?;

        Ok(FetchedImage {
            hash: ImageHash::new(hash),
            dir,
        })
    }
}

/// Per-pull state: the target repository and any bearer token obtained.
struct Session<'a> {
    client: &'a Client,
    repository: Repository,
    reference: String,
    token: Option<String>,
}

impl Session<'_> {
    fn error(&self, message: String) -> MinidockError {
        MinidockError::Fetch {
            reference: self.reference.clone(),
            message,
        }
    }

    fn manifest(&mut self, tag_or_digest: &str) -> Result<ManifestDocument> {
        let url = format!("{}/manifests/{tag_or_digest}", self.repository.base_url());
        let body = self
            .get(&url, Some(MANIFEST_ACCEPT))?
            .bytes()
            .map_err(|e| self.error(format!("failed to read manifest: {e}")))?;
        serde_json::from_slice(&body).map_err(|e| self.error(format!("invalid manifest: {e}")))
    }

    fn download_blob(&mut self, digest: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/blobs/{digest}", self.repository.base_url());
        let mut response = self.get(&url, None)?;

        let io_err = |e| MinidockError::Io {
            path: dest.to_path_buf(),
            source: e,
        };
        let file = File::create(dest).map_err(io_err)?;
        let mut writer = HashingWriter::new(BufWriter::new(file));
        let _ = response
            .copy_to(&mut writer)
            .map_err(|e| self.error(format!("failed to download {digest}: {e}")))?;
        let (mut inner, actual) = writer.finish();
        inner.flush().map_err(io_err)?;

        verify_digest(digest, digest, &actual)
    }

    /// Sends a GET, authenticating once if the registry asks for a token.
    fn get(&mut self, url: &str, accept: Option<&str>) -> Result<Response> {
        let response = self.send(url, accept)?;
        let response = if response.status() == StatusCode::UNAUTHORIZED && self.token.is_none() {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_challenge)
                .ok_or_else(|| self.error("registry requires unsupported authentication".into()))?;
            self.token = Some(self.request_token(&challenge)?);
            self.send(url, accept)?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(self.error(format!("GET {url} returned {}", response.status())));
        }
        Ok(response)
    }

    fn send(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request
            .send()
            .map_err(|e| self.error(format!("request to {url} failed: {e}")))
    }

    fn request_token(&self, challenge: &BearerChallenge) -> Result<String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", self.repository.path));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        tracing::debug!(realm = %challenge.realm, "requesting registry token");

        let response = self
            .client
            .get(&challenge.realm)
            .query(&query)
            .send()
            .map_err(|e| self.error(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(self.error(format!("token request returned {}", response.status())));
        }
        let body = response
            .bytes()
            .map_err(|e| self.error(format!("failed to read token: {e}")))?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| self.error(format!("invalid token response: {e}")))?;
        token
            .token
            .or(token.access_token)
            .ok_or_else(|| self.error("token response carries no token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_names_are_official_hub_images() {
        let repo = Repository::from_name("busybox");
        assert_eq!(repo.registry, DOCKER_HUB_REGISTRY);
        assert_eq!(repo.path, "library/busybox");
        assert_eq!(
            repo.base_url(),
            "https://registry-1.docker.io/v2/library/busybox"
        );
    }

    #[test]
    fn namespaced_hub_names_keep_their_path() {
        let repo = Repository::from_name("grafana/grafana");
        assert_eq!(repo.registry, DOCKER_HUB_REGISTRY);
        assert_eq!(repo.path, "grafana/grafana");
    }

    #[test]
    fn hub_aliases_map_to_the_api_host() {
        let repo = Repository::from_name("docker.io/alpine");
        assert_eq!(repo.registry, DOCKER_HUB_REGISTRY);
        assert_eq!(repo.path, "library/alpine");
    }

    #[test]
    fn explicit_hosts_are_recognized() {
        let repo = Repository::from_name("ghcr.io/owner/tool");
        assert_eq!(repo.registry, "ghcr.io");
        assert_eq!(repo.path, "owner/tool");

        let local = Repository::from_name("localhost:5000/app");
        assert_eq!(local.registry, "localhost:5000");
        assert_eq!(local.base_url(), "http://localhost:5000/v2/app");
    }

    #[test]
    fn challenge_with_comma_in_scope() {
        let challenge = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull,push""#,
        )
        .expect("challenge");
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/busybox:pull,push")
        );
    }

    #[test]
    fn challenge_without_realm_or_bearer_is_rejected() {
        assert_eq!(parse_challenge(r#"Bearer service="x""#), None);
        assert_eq!(parse_challenge(r#"Basic realm="registry""#), None);
    }

    #[test]
    fn arch_names_follow_registry_conventions() {
        assert_eq!(oci_arch("x86_64"), "amd64");
        assert_eq!(oci_arch("aarch64"), "arm64");
        assert_eq!(oci_arch("riscv64"), "riscv64");
    }

    #[test]
    fn index_selects_linux_entry_for_arch() {
        let doc: ManifestDocument = serde_json::from_str(
            r#"{"manifests":[
                {"digest":"sha256:win","platform":{"architecture":"amd64","os":"windows"}},
                {"digest":"sha256:arm","platform":{"architecture":"arm64","os":"linux"}},
                {"digest":"sha256:amd","platform":{"architecture":"amd64","os":"linux"}}
            ]}"#,
        )
        .expect("parse");
        let entries = doc.manifests.expect("index");
        assert_eq!(
            select_platform(&entries, "amd64").expect("amd64").digest,
            "sha256:amd"
        );
        let err = select_platform(&entries, "s390x").unwrap_err();
        assert!(err.contains("windows/amd64"));
        assert!(err.contains("linux/arm64"));
    }

    #[test]
    fn image_manifest_exposes_config_and_layers() {
        let doc: ManifestDocument = serde_json::from_str(
            r#"{"schemaVersion":2,"config":{"digest":"sha256:cfg","size":1},
                "layers":[{"digest":"sha256:l1"},{"digest":"sha256:l2"}]}"#,
        )
        .expect("parse");
        assert!(doc.manifests.is_none());
        assert_eq!(doc.config.expect("config").digest, "sha256:cfg");
        assert_eq!(doc.layers.len(), 2);
    }
}
