//! The fixed provisioning sequence: wipe the target directory, recreate it,
//! clone the artifactory repository and optionally kick off the image build.
//!
//! Every step is its own remote command. A failed step is reported and the
//! next one runs anyway.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::build_params::{display_opt, BuildParameters};
use crate::remote::{CommandOutcome, RemoteRunner};

pub const TARGET_DIR: &str = "/build_image";
pub const REPO_URL: &str = "https://github.com/dell/omnia-artifactory.git";
pub const CLONE_BRANCH: &str = "omnia-container";
pub const ARTIFACTORY_METHOD: &str = "omnia-artifactory";
pub const BUILD_SCRIPT: &str = "build_images.sh";

pub fn remove_dir_cmd() -> String {
    format!("sudo rm -rf {}", TARGET_DIR)
}

pub fn create_dir_cmd() -> String {
    format!("sudo mkdir -p {}", TARGET_DIR)
}

pub fn clone_cmd() -> String {
    format!(
        "sudo git clone --branch {} {} {}",
        CLONE_BRANCH, REPO_URL, TARGET_DIR
    )
}

pub fn build_cmd(images: &str, branch: &str) -> String {
    format!(
        "cd {} && sudo sh {} {} omnia_branch={}",
        TARGET_DIR, BUILD_SCRIPT, images, branch
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildDecision {
    Ran(CommandOutcome),
    NoImages,
    NotImplemented(Option<String>),
}

#[derive(Clone, Debug)]
pub struct ProvisionReport {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<CommandOutcome>,
    pub build: BuildDecision,
}

impl ProvisionReport {
    /// Every remote command that was issued, build included.
    pub fn outcomes(&self) -> impl Iterator<Item = &CommandOutcome> {
        let build = match &self.build {
            BuildDecision::Ran(outcome) => Some(outcome),
            _ => None,
        };
        self.steps.iter().chain(build)
    }

    pub fn failed_steps(&self) -> usize {
        self.outcomes().filter(|o| !o.success()).count()
    }

    /// Process exit status: 1 only when `strict` is set and a remote command
    /// failed.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if strict && self.failed_steps() > 0 {
            1
        } else {
            0
        }
    }

    pub fn summary_line(&self) -> String {
        let total = self.outcomes().count();
        let build = match &self.build {
            BuildDecision::Ran(_) => "build ran".to_string(),
            BuildDecision::NoImages => "no images to build".to_string(),
            BuildDecision::NotImplemented(method) => {
                format!("build method '{}' not implemented", display_opt(method))
            }
        };
        format!(
            "{}: {}/{} remote commands succeeded, {} in {}ms",
            self.target,
            total - self.failed_steps(),
            total,
            build,
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}

/// Steps 1-3 as (progress line, remote command) pairs.
pub fn prepare_steps(host: &str) -> Vec<(String, String)> {
    vec![
        (
            format!("Removing {} on {} (if any)...", TARGET_DIR, host),
            remove_dir_cmd(),
        ),
        (
            format!("Creating {} on {}...", TARGET_DIR, host),
            create_dir_cmd(),
        ),
        (
            format!("Cloning {} branch into {}...", CLONE_BRANCH, TARGET_DIR),
            clone_cmd(),
        ),
    ]
}

/// Steps 1-3: remove, recreate and clone into the target directory.
pub async fn prepare_and_clone<R: RemoteRunner>(runner: &R, host: &str) -> Vec<CommandOutcome> {
    let mut outcomes = Vec::with_capacity(3);
    for (progress, cmd) in prepare_steps(host) {
        println!("{}", progress);
        outcomes.push(runner.run(&cmd).await);
    }
    outcomes
}

/// Step 4 for the artifactory method. Nothing is issued for an empty image list.
pub async fn build_images<R: RemoteRunner>(
    runner: &R,
    host: &str,
    images: Option<&str>,
    branch: Option<&str>,
) -> BuildDecision {
    let images = match images.map(str::trim) {
        Some(images) if !images.is_empty() => images,
        _ => {
            println!("No images to build.");
            return BuildDecision::NoImages;
        }
    };
    let branch = branch.unwrap_or_default();

    println!(
        "Running {} on {} for images: {} with omnia_branch={}",
        BUILD_SCRIPT, host, images, branch
    );
    BuildDecision::Ran(runner.run(&build_cmd(images, branch)).await)
}

pub async fn run<R: RemoteRunner>(params: &BuildParameters, runner: &R) -> ProvisionReport {
    let started_at = Utc::now();
    let target = runner.describe_target();
    info!("provisioning {} into {}", target, TARGET_DIR);

    let host = display_opt(&params.server_ip);
    let steps = prepare_and_clone(runner, host).await;
    println!("Repository successfully cloned to {} on {}", TARGET_DIR, host);

    let build = if params.build_method.as_deref() == Some(ARTIFACTORY_METHOD) {
        build_images(
            runner,
            host,
            params.images.as_deref(),
            params.omnia_branch.as_deref(),
        )
        .await
    } else {
        println!(
            "Build method '{}' is not implemented yet.",
            display_opt(&params.build_method)
        );
        BuildDecision::NotImplemented(params.build_method.clone())
    };

    let report = ProvisionReport {
        target,
        started_at,
        finished_at: Utc::now(),
        steps,
        build,
    };
    if report.failed_steps() > 0 {
        warn!("{}", report.summary_line());
    } else {
        info!("{}", report.summary_line());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::remote::RecordingRunner;

    fn params(content: &str) -> BuildParameters {
        BuildParameters::from_map(&parse_config(content).unwrap())
    }

    #[tokio::test]
    async fn artifactory_method_runs_full_sequence() {
        let p = params(
            "SERVER_IP=10.0.0.5\nSERVER_USER=root\nBUILD_METHOD=omnia-artifactory\n\
             IMAGES=rocky8\nOMNIA_BRANCH=devel",
        );
        let runner = RecordingRunner::new("root@10.0.0.5");
        let report = run(&p, &runner).await;

        let cmds = runner.executed_commands();
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0], "sudo rm -rf /build_image");
        assert_eq!(cmds[1], "sudo mkdir -p /build_image");
        assert_eq!(
            cmds[2],
            "sudo git clone --branch omnia-container \
             https://github.com/dell/omnia-artifactory.git /build_image"
        );
        assert_eq!(
            cmds[3],
            "cd /build_image && sudo sh build_images.sh rocky8 omnia_branch=devel"
        );
        assert!(matches!(report.build, BuildDecision::Ran(_)));
        assert_eq!(report.target, "root@10.0.0.5");
        assert_eq!(report.failed_steps(), 0);
    }

    #[tokio::test]
    async fn other_method_skips_build() {
        let p = params("SERVER_IP=10.0.0.5\nBUILD_METHOD=docker\nIMAGES=rocky8");
        let runner = RecordingRunner::new("10.0.0.5");
        let report = run(&p, &runner).await;

        let cmds = runner.executed_commands();
        assert_eq!(cmds.len(), 3);
        assert!(cmds.iter().all(|c| !c.contains(BUILD_SCRIPT)));
        assert_eq!(
            report.build,
            BuildDecision::NotImplemented(Some("docker".to_string()))
        );
        assert!(report.summary_line().contains("'docker' not implemented"));
    }

    #[tokio::test]
    async fn absent_method_is_not_implemented() {
        let p = params("SERVER_IP=10.0.0.5\nIMAGES=rocky8");
        let runner = RecordingRunner::new("10.0.0.5");
        let report = run(&p, &runner).await;
        assert_eq!(report.build, BuildDecision::NotImplemented(None));
        assert_eq!(runner.executed_commands().len(), 3);
    }

    #[tokio::test]
    async fn empty_image_list_issues_no_build() {
        for content in [
            "SERVER_IP=10.0.0.5\nBUILD_METHOD=omnia-artifactory\nIMAGES=",
            "SERVER_IP=10.0.0.5\nBUILD_METHOD=omnia-artifactory",
        ] {
            let runner = RecordingRunner::new("10.0.0.5");
            let report = run(&params(content), &runner).await;
            assert_eq!(report.build, BuildDecision::NoImages);
            assert_eq!(runner.executed_commands().len(), 3);
        }
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_sequence() {
        let p = params(
            "SERVER_IP=10.0.0.5\nBUILD_METHOD=omnia-artifactory\nIMAGES=rocky8 rhel9\nOMNIA_BRANCH=main",
        );
        let runner = RecordingRunner::with_failures(
            "10.0.0.5",
            vec![Some("rm: permission denied".into()), None, Some("fatal: repo".into())],
        );
        let report = run(&p, &runner).await;

        assert_eq!(runner.executed_commands().len(), 4);
        assert_eq!(report.failed_steps(), 2);
        assert!(!report.steps[0].success());
        assert!(report.steps[1].success());
        assert!(report.summary_line().contains("2/4 remote commands succeeded"));
        assert_eq!(
            runner.executed_commands()[3],
            "cd /build_image && sudo sh build_images.sh rocky8 rhel9 omnia_branch=main"
        );
    }

    #[tokio::test]
    async fn missing_branch_passes_empty_value() {
        let runner = RecordingRunner::new("10.0.0.5");
        let decision = build_images(&runner, "10.0.0.5", Some("rocky8"), None).await;
        assert!(matches!(decision, BuildDecision::Ran(_)));
        assert_eq!(
            runner.executed_commands(),
            vec!["cd /build_image && sudo sh build_images.sh rocky8 omnia_branch="]
        );
    }

    #[tokio::test]
    async fn strict_exit_code_only_fails_on_failed_steps() {
        let p = params("SERVER_IP=10.0.0.5\nBUILD_METHOD=omnia-artifactory\nIMAGES=rocky8");

        let clean = run(&p, &RecordingRunner::new("10.0.0.5")).await;
        assert_eq!(clean.exit_code(false), 0);
        assert_eq!(clean.exit_code(true), 0);

        let failing = RecordingRunner::with_failures(
            "10.0.0.5",
            vec![None, None, None, Some("build failed".into())],
        );
        let failed = run(&p, &failing).await;
        assert_eq!(failed.failed_steps(), 1);
        assert_eq!(failed.exit_code(false), 0);
        assert_eq!(failed.exit_code(true), 1);
    }

    #[tokio::test]
    async fn skipped_build_with_failed_clone_still_counts_for_strict() {
        let p = params("SERVER_IP=10.0.0.5\nBUILD_METHOD=docker");
        let runner =
            RecordingRunner::with_failures("10.0.0.5", vec![None, None, Some("fatal".into())]);
        let report = run(&p, &runner).await;
        assert_eq!(report.exit_code(true), 1);
        assert_eq!(report.exit_code(false), 0);
    }

    #[test]
    fn progress_lines_name_the_bare_host() {
        let steps = prepare_steps("10.0.0.5");
        assert_eq!(steps[0].0, "Removing /build_image on 10.0.0.5 (if any)...");
        assert_eq!(steps[1].0, "Creating /build_image on 10.0.0.5...");
        assert_eq!(steps[2].0, "Cloning omnia-container branch into /build_image...");
        assert!(steps.iter().all(|(line, _)| !line.contains('@')));
    }
}
