//! Runs the components in dependency order. The database starts right away; the
//! certificates come first on the other branch, then site + artifact bucket together.
//! The app waits for both branches and DNS comes last.

use std::path::{Path, PathBuf};

use aws_cfn_stack::StackSpec;
use tracing::{info, warn};

use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};
use crate::handles::ResourceHandles;
use crate::provision::app_host::{app_stack, artifacts_stack, provision_app, provision_artifacts};
use crate::provision::certificate::{certificate_stacks, provision_certificates, Certificates};
use crate::provision::database::{database_stack, network_warnings, provision_database};
use crate::provision::dns::{dns_stack, provision_dns};
use crate::provision::static_site::{build_site, policy_note, provision_site, publish_build, site_stack, SiteHandles};
use crate::provision::{ObjectStore, StackDeployer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Certificate,
    Site,
    Database,
    App,
}

/// every stack template for the configuration, without parameter values.
pub fn all_stacks(config: &DeploymentConfig) -> Result<Vec<StackSpec>> {
    let mut stacks = certificate_stacks(config)?;
    stacks.push(site_stack(config)?);
    stacks.push(database_stack(config)?);
    stacks.push(artifacts_stack(config)?);
    stacks.push(app_stack(config)?);
    stacks.push(dns_stack(config)?);
    Ok(stacks)
}

/// write every template to `out_dir` as `{stack}.json`. Makes no AWS calls.
pub fn plan(config: &DeploymentConfig, out_dir: &Path) -> Result<Vec<PathBuf>> {
    for warning in network_warnings(config) {
        warn!("{warning}");
    }
    if let Some(note) = policy_note(config) {
        info!("{note}");
    }
    std::fs::create_dir_all(out_dir)?;
    let mut written = vec![];
    for spec in all_stacks(config)? {
        let path = out_dir.join(format!("{}.json", spec.name));
        std::fs::write(&path, spec.template_body()?)?;
        info!(stack = %spec.name, region = %spec.region, path = %path.display(), parameters = ?spec.missing_parameters(), "Rendered template");
        written.push(path);
    }
    Ok(written)
}

pub struct Deployment<'a> {
    config: &'a DeploymentConfig,
    deployer: &'a dyn StackDeployer,
    store: &'a dyn ObjectStore,
}

impl<'a> Deployment<'a> {
    pub fn new(config: &'a DeploymentConfig, deployer: &'a dyn StackDeployer, store: &'a dyn ObjectStore) -> Self {
        Self { config, deployer, store }
    }

    async fn site(&self, certificates: &Certificates) -> Result<SiteHandles> {
        build_site(self.config).await?;
        let build_path = &self.config.site.build_path;
        if !build_path.is_dir() {
            return Err(DeployError::config(format!("Build directory {} does not exist", build_path.display())));
        }
        let site = provision_site(self.deployer, self.config, &certificates.edge_arn).await?;
        publish_build(self.store, &site.bucket, build_path).await?;
        Ok(site)
    }

    pub async fn run(&self, target: Target) -> Result<ResourceHandles> {
        let config = self.config;
        let mut handles = ResourceHandles::default();

        match target {
            Target::Certificate => {
                handles.certificates = Some(provision_certificates(self.deployer, config).await?);
            }
            Target::Site => {
                let certificates = provision_certificates(self.deployer, config).await?;
                handles.site = Some(self.site(&certificates).await?);
                handles.certificates = Some(certificates);
            }
            Target::Database => {
                handles.database = Some(provision_database(self.deployer, config).await?);
            }
            Target::App => {
                let (certificates, database, bucket) = tokio::try_join!(
                    provision_certificates(self.deployer, config),
                    provision_database(self.deployer, config),
                    provision_artifacts(self.deployer, config),
                )?;
                let app = provision_app(self.deployer, self.store, config, &certificates, &database, &bucket).await?;
                handles.certificates = Some(certificates);
                handles.database = Some(database);
                handles.artifact_bucket = Some(bucket);
                handles.app = Some(app);
            }
            Target::All => {
                let edge = async {
                    let certificates = provision_certificates(self.deployer, config).await?;
                    let (site, bucket) =
                        tokio::try_join!(self.site(&certificates), provision_artifacts(self.deployer, config))?;
                    Ok::<_, DeployError>((certificates, site, bucket))
                };
                // a certificate failure must not cancel the database
                let (edge, database) = tokio::join!(edge, provision_database(self.deployer, config));
                let database = database?;
                let (certificates, site, bucket) = edge?;
                let app = provision_app(self.deployer, self.store, config, &certificates, &database, &bucket).await?;
                handles.dns = Some(provision_dns(self.deployer, config, &site.distribution_domain).await?);
                handles.certificates = Some(certificates);
                handles.site = Some(site);
                handles.database = Some(database);
                handles.artifact_bucket = Some(bucket);
                handles.app = Some(app);
            }
        }
        if matches!(target, Target::Site | Target::App) {
            info!("DNS records are only written by a full deploy");
        }
        handles.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::fakes::{FakeDeployer, FakeStore};

    struct Workspace {
        _dir: tempfile::TempDir,
        config: DeploymentConfig,
    }

    fn workspace(region: &str) -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        let app = dir.path().join("app");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(build.join("index.html"), "<html></html>").unwrap();
        std::fs::write(app.join("application.py"), "application = None\n").unwrap();
        std::fs::write(app.join("requirements.txt"), "Django==4.2\nmysqlclient\n").unwrap();

        let mut config = DeploymentConfig::default();
        config.domain_name = "example.com".into();
        config.hosted_zone_id = "Z1".into();
        config.region = region.into();
        config.site.build_path = build;
        config.app.app_path = app;
        Workspace { _dir: dir, config }
    }

    fn deployer() -> FakeDeployer {
        FakeDeployer::default()
            .with_output("BucketName", "www.example.com")
            .with_output("ArtifactBucketName", "bundles")
    }

    fn position(names: &[String], stack: &str) -> usize {
        names.iter().position(|n| n == stack).unwrap_or_else(|| panic!("{stack} was not deployed: {names:?}"))
    }

    #[tokio::test]
    async fn full_deploy_respects_dependencies() {
        let ws = workspace("us-east-1");
        let deployer = deployer();
        let store = FakeStore::default();
        let handles = Deployment::new(&ws.config, &deployer, &store).run(Target::All).await.unwrap();

        let names = deployer.names();
        assert_eq!(names.len(), 6);
        let cert = position(&names, "web-app-certificate");
        let site = position(&names, "web-app-site");
        let app = position(&names, "web-app-app");
        let dns = position(&names, "web-app-dns");
        assert!(site > cert && app > cert);
        assert!(app > position(&names, "web-app-database"));
        assert!(app > position(&names, "web-app-artifacts"));
        assert_eq!(dns, names.len() - 1);

        assert_eq!(store.keys("www.example.com"), vec!["index.html"]);
        assert_eq!(store.keys("bundles").len(), 1);
        assert_eq!(handles.dns.unwrap().frontend, "www.example.com");
        assert_eq!(handles.site.unwrap().bucket, "www.example.com");
        assert_eq!(
            deployer.spec("web-app-dns").unwrap().parameters["DistributionDomain"],
            "web-app-site/DistributionDomain"
        );
    }

    #[tokio::test]
    async fn certificates_go_where_they_are_used() {
        let ws = workspace("eu-west-1");
        let deployer = deployer();
        let store = FakeStore::default();
        Deployment::new(&ws.config, &deployer, &store).run(Target::All).await.unwrap();
        assert_eq!(
            deployer.spec("web-app-site").unwrap().parameters["CertificateArn"],
            "web-app-edge-certificate/CertificateArn"
        );
        assert_eq!(deployer.spec("web-app-app").unwrap().parameters["CertificateArn"], "web-app-certificate/CertificateArn");
    }

    #[tokio::test]
    async fn redeploy_only_changes_the_artifact_key() {
        let ws = workspace("us-east-1");
        let store = FakeStore::default();

        let first = deployer();
        Deployment::new(&ws.config, &first, &store).run(Target::App).await.unwrap();
        let again = deployer();
        Deployment::new(&ws.config, &again, &store).run(Target::App).await.unwrap();
        assert_eq!(first.spec("web-app-app"), again.spec("web-app-app"));

        std::fs::write(ws.config.app.app_path.join("application.py"), "application = 1\n").unwrap();
        let changed = deployer();
        let handles = Deployment::new(&ws.config, &changed, &store).run(Target::App).await.unwrap();

        let before = first.spec("web-app-app").unwrap();
        let after = changed.spec("web-app-app").unwrap();
        assert_eq!(before.template, after.template);
        let differing: Vec<&String> = before
            .parameters
            .iter()
            .filter(|(k, v)| after.parameters.get(*k) != Some(*v))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(differing, vec!["ArtifactKey"]);
        assert_eq!(handles.app.unwrap().cname, "web-env.us-east-1.elasticbeanstalk.com");
        assert!(changed.spec("web-app-dns").is_none());
    }

    #[tokio::test]
    async fn failed_certificate_stops_what_depends_on_it() {
        let ws = workspace("us-east-1");
        let deployer = deployer().failing("web-app-certificate", "Certificate: CAA record prevents issuance");
        let store = FakeStore::default();
        let err = Deployment::new(&ws.config, &deployer, &store).run(Target::All).await.unwrap_err();
        assert!(matches!(err, DeployError::CertificateRejected { .. }));
        let mut names = deployer.names();
        names.sort();
        assert_eq!(names, vec!["web-app-certificate", "web-app-database"]);
    }

    #[tokio::test]
    async fn database_alone_skips_certificates() {
        let ws = workspace("eu-west-1");
        let deployer = deployer().failing("web-app-certificate", "Certificate: CAA record prevents issuance");
        let store = FakeStore::default();
        let handles = Deployment::new(&ws.config, &deployer, &store).run(Target::Database).await.unwrap();
        assert_eq!(deployer.names(), vec!["web-app-database"]);
        assert!(handles.certificates.is_none());
        assert_eq!(handles.database.unwrap().host, "web-app-database/DatabaseHost");
    }

    #[tokio::test]
    async fn database_runs_alongside_certificates() {
        let ws = workspace("eu-west-1");
        let deployer = deployer().yielding();
        let store = FakeStore::default();
        Deployment::new(&ws.config, &deployer, &store).run(Target::All).await.unwrap();

        let overlaps = deployer.overlaps();
        let together = |x: &str, y: &str| overlaps.iter().any(|(a, b)| (a == x && b == y) || (a == y && b == x));
        assert!(together("web-app-edge-certificate", "web-app-database"));
        // only the certificate and dns stacks write to the hosted zone
        let zone_writer = |name: &str| name.ends_with("certificate") || name.ends_with("-dns");
        assert!(
            !overlaps.iter().any(|(a, b)| zone_writer(a) && zone_writer(b)),
            "hosted zone writes overlapped: {overlaps:?}"
        );
    }

    #[tokio::test]
    async fn missing_build_directory_fails_before_site_stack() {
        let mut ws = workspace("us-east-1");
        ws.config.site.build_path = ws.config.site.build_path.join("missing");
        let deployer = deployer();
        let store = FakeStore::default();
        assert!(Deployment::new(&ws.config, &deployer, &store).run(Target::Site).await.is_err());
        assert!(deployer.spec("web-app-site").is_none());
    }

    #[test]
    fn plan_writes_every_template() {
        let ws = workspace("eu-central-1");
        let out = tempfile::tempdir().unwrap();
        let written = plan(&ws.config, out.path()).unwrap();
        let names: Vec<String> = written.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(
            names,
            vec![
                "web-app-edge-certificate.json",
                "web-app-certificate.json",
                "web-app-site.json",
                "web-app-database.json",
                "web-app-artifacts.json",
                "web-app-app.json",
                "web-app-dns.json",
            ]
        );
        let body: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&written[2]).unwrap()).unwrap();
        assert_eq!(body["Resources"]["SiteBucket"]["Properties"]["BucketName"], "www.example.com");
    }
}
