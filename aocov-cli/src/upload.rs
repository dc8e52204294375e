//! `aocov upload`: send a coverage report for the current commit.

use crate::CliResult;
use crate::client::{ServerArgs, ServerClient, check_upload_reply, endpoint, server_base};
use aocov_core::{FormatRegistry, validate_segment};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::process::Command;

/// CLI arguments for the upload command.
#[derive(Args, Clone, Debug)]
pub struct UploadArgs {
    /// Coverage report to upload.
    pub file: PathBuf,
    /// Report format.
    #[arg(long, env = "AOCOV_FORMAT", default_value = "tarpaulin", value_parser = parse_format)]
    pub format: String,
    /// Organization owning the repository.
    #[arg(long, env = "AOCOV_ORG")]
    pub org: String,
    /// Repository name.
    #[arg(long, env = "AOCOV_REPO")]
    pub repo: String,
    /// Branch name; defaults to the checked-out branch.
    #[arg(long, env = "AOCOV_BRANCH")]
    pub branch: Option<String>,
    /// Commit identifier; defaults to the checked-out commit.
    #[arg(long, env = "AOCOV_COMMIT")]
    pub commit: Option<String>,
    /// Upload token.
    #[arg(long, env = "AOCOV_TOKEN", hide_env_values = true)]
    pub token: String,
    #[command(flatten)]
    pub server: ServerArgs,
    /// How to print the resulting links.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Output style for the upload summary.
#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn parse_format(value: &str) -> Result<String, String> {
    let registry = FormatRegistry::builtin();
    if registry.contains(value) {
        Ok(value.to_string())
    } else {
        Err(format!(
            "unknown format {value:?} (expected one of: {})",
            registry.list_formats().join(", ")
        ))
    }
}

/// Links to the artifacts of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub branch: String,
    pub commit: String,
    pub coverage_badge: String,
    pub report: String,
    pub commit_badge: String,
    pub commit_report: String,
}

impl UploadSummary {
    fn render_text(&self) -> String {
        format!(
            "Uploaded {commit} to {branch}\n  badge:         {}\n  report:        {}\n  commit badge:  {}\n  commit report: {}\n",
            self.coverage_badge,
            self.report,
            self.commit_badge,
            self.commit_report,
            commit = self.commit,
            branch = self.branch,
        )
    }
}

/// Source of the branch and commit of the working copy.
pub(crate) trait Checkout {
    fn branch<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>>;
    fn commit<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>>;
}

/// Reads branch and commit through `git rev-parse`.
#[cfg_attr(test, allow(dead_code))]
pub(crate) struct GitCheckout;

impl Checkout for GitCheckout {
    fn branch<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
        Box::pin(async {
            let branch = rev_parse(&["--abbrev-ref", "HEAD"]).await?;
            if branch == "HEAD" {
                return Err("detached HEAD; pass --branch".into());
            }
            Ok(branch)
        })
    }

    fn commit<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
        Box::pin(rev_parse(&["HEAD"]))
    }
}

async fn rev_parse(args: &[&str]) -> CliResult<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .args(args)
        .output()
        .await
        .map_err(|err| format!("cannot run git: {err}"))?;
    if !output.status.success() {
        return Err(format!(
            "git rev-parse {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Upload with real HTTP and git, then print the links.
#[cfg(not(test))]
pub async fn run_upload(args: UploadArgs) -> CliResult<()> {
    let client = crate::client::ReqwestServerClient::new()?;
    let output = args.output;
    let summary = run_upload_with(args, &client, &GitCheckout).await?;
    match output {
        OutputFormat::Text => print!("{}", summary.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

/// Upload with injected dependencies.
pub(crate) async fn run_upload_with<C: ServerClient, G: Checkout>(
    args: UploadArgs,
    client: &C,
    checkout: &G,
) -> CliResult<UploadSummary> {
    let registry = FormatRegistry::builtin();
    let format = registry
        .get_format(&args.format)
        .ok_or_else(|| format!("unknown format {:?}", args.format))?;
    let extension = Path::new(format.file_name())
        .extension()
        .and_then(|extension| extension.to_str())
        .ok_or_else(|| format!("format {} has no report extension", format.id()))?;

    let branch = match args.branch {
        Some(branch) => branch,
        None => checkout.branch().await?,
    };
    let commit = match args.commit {
        Some(commit) => commit,
        None => checkout.commit().await?,
    };
    for (name, value) in [
        ("organization", &args.org),
        ("repository", &args.repo),
        ("branch", &branch),
        ("commit", &commit),
    ] {
        validate_segment(value).map_err(|_| format!("{name} {value:?} cannot be used in a url"))?;
    }

    let base = server_base(&args.server.server_url)?;
    let commit_file = |extension: &str| format!("{commit}.{extension}");
    let branch_file = |extension: &str| format!("{branch}.{extension}");
    let (org, repo) = (args.org.as_str(), args.repo.as_str());
    let commit_path = |file: &str| endpoint(&base, ["v1", org, repo, branch.as_str(), file]);
    let branch_path = |file: &str| endpoint(&base, ["v1", org, repo, file]);

    let mut upload_url = commit_path(&commit_file(extension))?;
    upload_url
        .query_pairs_mut()
        .append_pair("token", &args.token)
        .append_pair("format", format.id());

    let body = tokio::fs::read(&args.file)
        .await
        .map_err(|err| format!("cannot read {}: {err}", args.file.display()))?;
    let reply = client.post(&upload_url, body).await?;
    check_upload_reply(&reply)?;

    Ok(UploadSummary {
        coverage_badge: branch_path(&branch_file("svg"))?.to_string(),
        report: branch_path(&branch_file(extension))?.to_string(),
        commit_badge: commit_path(&commit_file("svg"))?.to_string(),
        commit_report: commit_path(&commit_file(extension))?.to_string(),
        branch,
        commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{RecordingClient, reply};
    use std::io::Write as _;

    struct FixedCheckout;

    impl Checkout for FixedCheckout {
        fn branch<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
            Box::pin(async { Ok("main".to_string()) })
        }

        fn commit<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
            Box::pin(async { Ok("abc123".to_string()) })
        }
    }

    struct NoCheckout;

    impl Checkout for NoCheckout {
        fn branch<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
            Box::pin(async { Err("not a git repository".into()) })
        }

        fn commit<'a>(&'a self) -> Pin<Box<dyn Future<Output = CliResult<String>> + Send + 'a>> {
            Box::pin(async { Err("not a git repository".into()) })
        }
    }

    fn report_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write report");
        file
    }

    fn args(file: &Path, format: &str) -> UploadArgs {
        UploadArgs {
            file: file.to_path_buf(),
            format: format.to_string(),
            org: "testorg".to_string(),
            repo: "testrepo".to_string(),
            branch: None,
            commit: None,
            token: "zzzz".to_string(),
            server: ServerArgs {
                server_url: "http://localhost:3000/".to_string(),
            },
            output: OutputFormat::Text,
        }
    }

    #[test]
    fn format_parser_accepts_registered_formats() {
        assert_eq!(parse_format("cobertura").as_deref(), Ok("cobertura"));
        let err = parse_format("pepperoni").unwrap_err();
        assert!(err.contains("tarpaulin, cobertura"));
    }

    #[tokio::test]
    async fn upload_posts_to_the_commit_path() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(vec![reply(200, "")]);

        let summary = run_upload_with(args(report.path(), "tarpaulin"), &client, &FixedCheckout)
            .await
            .expect("upload");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].url,
            "http://localhost:3000/v1/testorg/testrepo/main/abc123.html?token=zzzz&format=tarpaulin"
        );
        assert_eq!(requests[0].body, b"<html></html>");

        assert_eq!(
            summary.coverage_badge,
            "http://localhost:3000/v1/testorg/testrepo/main.svg"
        );
        assert_eq!(summary.report, "http://localhost:3000/v1/testorg/testrepo/main.html");
        assert_eq!(
            summary.commit_badge,
            "http://localhost:3000/v1/testorg/testrepo/main/abc123.svg"
        );
        assert!(!summary.render_text().contains("zzzz"));
    }

    #[tokio::test]
    async fn cobertura_uses_the_xml_extension() {
        let report = report_file("<coverage/>");
        let client = RecordingClient::new(vec![reply(200, "")]);

        let summary = run_upload_with(args(report.path(), "cobertura"), &client, &FixedCheckout)
            .await
            .expect("upload");

        assert!(client.requests()[0].url.contains("/abc123.xml?"));
        assert_eq!(summary.report, "http://localhost:3000/v1/testorg/testrepo/main.xml");
    }

    #[tokio::test]
    async fn explicit_branch_and_commit_skip_git() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(vec![reply(200, "")]);
        let mut args = args(report.path(), "tarpaulin");
        args.branch = Some("release-1.2".to_string());
        args.commit = Some("def456".to_string());

        let summary = run_upload_with(args, &client, &NoCheckout)
            .await
            .expect("upload");
        assert_eq!(summary.branch, "release-1.2");
        assert_eq!(summary.commit, "def456");
    }

    #[tokio::test]
    async fn token_is_query_encoded() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(vec![reply(200, "")]);
        let mut args = args(report.path(), "tarpaulin");
        args.token = "a&b=c".to_string();

        run_upload_with(args, &client, &FixedCheckout)
            .await
            .expect("upload");
        assert!(client.requests()[0].url.contains("token=a%26b%3Dc&"));
    }

    #[tokio::test]
    async fn server_rejection_is_reported() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(vec![reply(401, "Invalid token")]);

        let err = run_upload_with(args(report.path(), "tarpaulin"), &client, &FixedCheckout)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "the server rejected the upload token");
    }

    #[tokio::test]
    async fn git_failure_is_reported_before_upload() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(Vec::new());

        let err = run_upload_with(args(report.path(), "tarpaulin"), &client, &NoCheckout)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not a git repository");
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn branches_with_separators_are_rejected() {
        let report = report_file("<html></html>");
        let client = RecordingClient::new(Vec::new());
        let mut args = args(report.path(), "tarpaulin");
        args.branch = Some("feature/x".to_string());

        let err = run_upload_with(args, &client, &FixedCheckout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("branch \"feature/x\""));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_report_file_is_reported() {
        let client = RecordingClient::new(Vec::new());
        let dir = tempfile::tempdir().expect("temp dir");

        let err = run_upload_with(
            args(&dir.path().join("missing.html"), "tarpaulin"),
            &client,
            &FixedCheckout,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("cannot read "));
    }

    #[test]
    fn summary_serializes_links() {
        let summary = UploadSummary {
            branch: "main".to_string(),
            commit: "abc123".to_string(),
            coverage_badge: "b".to_string(),
            report: "r".to_string(),
            commit_badge: "cb".to_string(),
            commit_report: "cr".to_string(),
        };
        let value = serde_json::to_value(&summary).expect("json");
        assert_eq!(value["coverage_badge"], "b");
        assert_eq!(value["commit"], "abc123");
    }
}
