use std::path::Path;

use aws_cfn_stack::{get_att, get_ref, select_s3website_host, Input, StackError, StackSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::DirEntry;

use super::{require_output, ObjectStore, StackDeployer};
use crate::bundle::{collect_files, slash_path};
use crate::config::{DeploymentConfig, RecordType};
use crate::error::{DeployError, Result};
use crate::hooks::run_command;
use crate::resources::cloudfront::{forbidden_remap, Distribution};
use crate::resources::s3_bucket::{PublicReadPolicy, WebsiteBucket};

const BUCKET: &str = "SiteBucket";
const DISTRIBUTION: &str = "Distribution";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteHandles {
    pub bucket: String,
    pub website_url: String,
    pub distribution_id: String,
    pub distribution_domain: String,
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// the origin-request and response-headers policies are an unresolved choice;
/// nothing is attached unless the operator picks one.
pub fn policy_note(config: &DeploymentConfig) -> Option<&'static str> {
    let site = &config.site;
    match (&site.origin_request_policy_id, &site.response_headers_policy_id) {
        (None, None) => Some("No origin request or response headers policy configured, distribution uses none"),
        _ => None,
    }
}

pub fn site_stack(config: &DeploymentConfig) -> Result<StackSpec> {
    let bucket_name = config.bucket_name();
    if bucket_name != config.frontend_domain() {
        return Err(DeployError::BucketNameMismatch { bucket: bucket_name, domain: config.frontend_domain() });
    }
    let site = &config.site;
    let mut input = Input::new(format!("Static site for {}", config.frontend_domain()));
    input.parameter("CertificateArn", "us-east-1 certificate covering the frontend domain");
    input.resource(
        BUCKET,
        WebsiteBucket {
            bucket_name,
            index_document: site.index_document.clone(),
            error_document: site.error_document().to_string(),
        },
    );
    input.resource("SiteBucketPolicy", PublicReadPolicy { bucket_logical_id: BUCKET.to_string() });
    input.resource(
        DISTRIBUTION,
        Distribution {
            comment: config.frontend_domain(),
            aliases: vec![config.frontend_domain()],
            certificate_arn: get_ref("CertificateArn"),
            origin_domain: select_s3website_host(BUCKET),
            origin_id: "s3-website".into(),
            default_root_object: site.default_root_object.clone(),
            cache_policy_id: site.cache_policy.id().to_string(),
            origin_request_policy_id: site.origin_request_policy_id.clone(),
            response_headers_policy_id: site.response_headers_policy_id.clone(),
            error_responses: forbidden_remap(&site.index_document),
            ipv6: config.dns.record_type == RecordType::Aaaa,
            ..Default::default()
        },
    );
    input.output("BucketName", "bucket holding the site", get_ref(BUCKET));
    input.output("WebsiteURL", "bucket website endpoint", get_att(BUCKET, "WebsiteURL"));
    input.output("DistributionId", "cloudfront distribution id", get_ref(DISTRIBUTION));
    input.output("DistributionDomain", "cloudfront domain name", get_att(DISTRIBUTION, "DomainName"));
    Ok(StackSpec::new(&config.stack_name("site"), &config.region, input.into_template()?)?)
}

fn bucket_error(err: DeployError, bucket: &str) -> DeployError {
    if let DeployError::Stack(StackError::Failed { reason, .. }) = &err {
        if reason.contains("BucketAlreadyExists") {
            return DeployError::BucketOwnedElsewhere(bucket.to_string());
        }
    }
    err
}

pub async fn provision_site(deployer: &dyn StackDeployer, config: &DeploymentConfig, edge_certificate_arn: &str) -> Result<SiteHandles> {
    if let Some(note) = policy_note(config) {
        info!("{note}");
    }
    let spec = site_stack(config)?.with_parameter("CertificateArn", edge_certificate_arn);
    let outputs = deployer.deploy(&spec).await.map_err(|e| bucket_error(e, &config.bucket_name()))?;
    let bucket = require_output(&spec.name, &outputs, "BucketName")?;
    if bucket != config.frontend_domain() {
        return Err(DeployError::BucketNameMismatch { bucket, domain: config.frontend_domain() });
    }
    let handles = SiteHandles {
        bucket,
        website_url: require_output(&spec.name, &outputs, "WebsiteURL")?,
        distribution_id: require_output(&spec.name, &outputs, "DistributionId")?,
        distribution_domain: require_output(&spec.name, &outputs, "DistributionDomain")?,
    };
    info!(bucket = %handles.bucket, distribution = %handles.distribution_domain, "Static site is ready");
    Ok(handles)
}

/// files the desktop leaves behind. Dot directories such as `.well-known` are published.
const OS_JUNK: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

fn os_junk(entry: &DirEntry) -> bool {
    let junk = !entry.file_type().is_dir() && entry.file_name().to_str().map(|n| OS_JUNK.contains(&n)).unwrap_or(false);
    if junk {
        debug!(path = %entry.path().display(), "Not publishing");
    }
    junk
}

/// runs the configured build command from the parent of the build directory.
pub async fn build_site(config: &DeploymentConfig) -> Result<()> {
    let Some(command) = &config.site.build_command else { return Ok(()) };
    let work_dir = match config.site.build_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    run_command(command, &work_dir).await
}

/// upload the contents of `build_dir` to the bucket root. Returns the number of files.
pub async fn publish_build(store: &dyn ObjectStore, bucket: &str, build_dir: &Path) -> Result<usize> {
    if !build_dir.is_dir() {
        return Err(DeployError::config(format!("Build directory {} does not exist", build_dir.display())));
    }
    let files = collect_files(build_dir, &os_junk)?;
    for relative in files.iter() {
        let key = slash_path(relative);
        let body = tokio::fs::read(build_dir.join(relative)).await?;
        store.put_object(bucket, &key, body, content_type_for(relative)).await?;
    }
    info!(bucket = %bucket, files = files.len(), "Published build");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::fakes::{FakeDeployer, FakeStore};

    fn config() -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.domain_name = "example.com".into();
        config.hosted_zone_id = "Z1".into();
        config
    }

    #[test]
    fn template_names_bucket_after_domain() {
        let spec = site_stack(&config()).unwrap();
        let bucket = &spec.template.resources["SiteBucket"].properties;
        assert_eq!(bucket["BucketName"], "www.example.com");
        assert_eq!(bucket["WebsiteConfiguration"]["IndexDocument"], bucket["WebsiteConfiguration"]["ErrorDocument"]);
        let dist = &spec.template.resources["Distribution"].properties["DistributionConfig"];
        assert_eq!(dist["Aliases"][0], "www.example.com");
        assert_eq!(dist["CustomErrorResponses"][0]["ResponseCode"], 200);
        assert_eq!(dist["CustomErrorResponses"][0]["ResponsePagePath"], "/index.html");
        assert_eq!(dist["DefaultCacheBehavior"]["CachePolicyId"], "4135ea2d-6df8-44a3-9df3-4b5a84be39ad");
        assert_eq!(spec.missing_parameters(), vec!["CertificateArn".to_string()]);
    }

    #[test]
    fn aaaa_records_enable_ipv6() {
        let mut config = config();
        config.dns.record_type = RecordType::Aaaa;
        let spec = site_stack(&config).unwrap();
        assert_eq!(spec.template.resources["Distribution"].properties["DistributionConfig"]["IPV6Enabled"], true);
    }

    #[test]
    fn content_types_follow_extensions() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("static/js/main.1a2b.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("logo.SVG")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
    }

    #[tokio::test]
    async fn taken_bucket_is_reported() {
        let deployer = FakeDeployer::default().failing("web-app-site", "SiteBucket: www.example.com already exists (Error Code: BucketAlreadyExists)");
        let err = provision_site(&deployer, &config(), "arn:cert").await.unwrap_err();
        assert!(matches!(err, DeployError::BucketOwnedElsewhere(ref b) if b == "www.example.com"));
    }

    #[tokio::test]
    async fn reported_bucket_must_match_domain() {
        let deployer = FakeDeployer::default().with_output("BucketName", "other.example.com");
        let err = provision_site(&deployer, &config(), "arn:cert").await.unwrap_err();
        assert!(matches!(err, DeployError::BucketNameMismatch { .. }));

        let deployer = FakeDeployer::default().with_output("BucketName", "www.example.com");
        let handles = provision_site(&deployer, &config(), "arn:cert").await.unwrap();
        assert_eq!(handles.distribution_domain, "web-app-site/DistributionDomain");
        assert_eq!(deployer.spec("web-app-site").unwrap().parameters["CertificateArn"], "arn:cert");
    }

    #[tokio::test]
    async fn publishes_directory_contents_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static/css")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("static/css/main.css"), "body{}").unwrap();
        std::fs::create_dir_all(dir.path().join(".well-known")).unwrap();
        std::fs::write(dir.path().join(".well-known/apple-app-site-association"), "{}").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), "x").unwrap();
        std::fs::write(dir.path().join("static/.DS_Store"), "x").unwrap();
        let store = FakeStore::default();
        let count = publish_build(&store, "www.example.com", dir.path()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            store.keys("www.example.com"),
            vec![".well-known/apple-app-site-association", "index.html", "static/css/main.css"]
        );
        assert_eq!(store.content_type("www.example.com", "static/css/main.css").as_deref(), Some("text/css"));
        assert!(publish_build(&store, "b", &dir.path().join("missing")).await.is_err());
    }
}
