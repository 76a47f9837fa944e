//! Run orchestration: start, stop and clear.
//!
//! One control thread drives the whole run; concurrency lives entirely at
//! the OS-process level. Start launches workers sequentially (each spawn
//! returns immediately) and then blocks until every worker exits. Stop is
//! fire-and-forget per bot. Clear wipes the registry root.
//!
//! Error policy follows the batch-tolerant contract: unmatched selectors
//! and per-bot failures (missing media, failed stop) are warned about and
//! skipped; catalog and registry-root errors abort the run before any
//! process is touched.

use rand::Rng;

use crate::catalog::{self, CatalogError};
use crate::command::{self, WorkerPaths};
use crate::config::InjectionConfig;
use crate::registry::{ProcessRegistry, RegistryError, TerminateOutcome};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Selected run mode; clear is mutually exclusive with the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Start,
    Stop,
    Clear,
}

impl RunMode {
    pub fn from_flags(stop: bool, clear: bool) -> Self {
        if clear {
            Self::Clear
        } else if stop {
            Self::Stop
        } else {
            Self::Start
        }
    }
}

/// Outcome of a start run, after every launched worker has exited.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Workers successfully spawned (and waited on).
    pub launched: usize,
    /// Bots skipped due to per-bot errors.
    pub skipped: usize,
    /// Selectors that matched nothing in the catalog.
    pub unmatched_selectors: Vec<String>,
}

/// Outcome of a stop run.
#[derive(Debug, Default)]
pub struct StopReport {
    /// Bots whose recorded process was signalled.
    pub terminated: usize,
    /// Bots whose termination failed (unreadable record, dead process).
    pub failed: usize,
    /// Selectors that matched nothing in the catalog.
    pub unmatched_selectors: Vec<String>,
}

pub struct Orchestrator<R: ProcessRegistry> {
    paths: WorkerPaths,
    registry: R,
}

impl<R: ProcessRegistry> Orchestrator<R> {
    pub fn new(paths: WorkerPaths, registry: R) -> Self {
        Self { paths, registry }
    }

    /// Launch every bot of every conversation matched by the configured
    /// selectors, then block until all of them exit.
    pub async fn start(
        &self,
        cfg: &InjectionConfig,
        rng: &mut impl Rng,
    ) -> Result<StartReport, OrchestratorError> {
        tracing::info!("about to inject media into \"{}\"", cfg.conf_alias);
        let conversations = catalog::scan_conversations(&self.paths.conversations_root)?;

        let mut report = StartReport::default();
        let mut children = Vec::new();

        for selector in &cfg.selectors {
            let matched = match_selector(selector, &conversations);
            if matched.is_empty() {
                tracing::warn!(
                    "invalid conversation index specified \"{selector}\", request ignored"
                );
                report.unmatched_selectors.push(selector.clone());
                continue;
            }
            for conversation in matched {
                for bot in self.conversation_bots(conversation)? {
                    match self.launch_bot(cfg, conversation, &bot, rng) {
                        Ok(child) => {
                            children.push(child);
                            report.launched += 1;
                        }
                        Err(err) => {
                            tracing::warn!(
                                "skipping bot \"{}\" in {conversation}: {err}",
                                bot.name
                            );
                            report.skipped += 1;
                        }
                    }
                }
            }
        }

        tracing::info!("injecting {} bots", children.len());
        for mut child in children {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!("worker exited with {status}"),
                Err(err) => tracing::warn!("wait on worker failed: {err}"),
            }
        }

        Ok(report)
    }

    /// Signal every previously launched bot matched by the configured
    /// selectors. Does not wait for the processes to die.
    pub fn stop(&self, cfg: &InjectionConfig) -> Result<StopReport, OrchestratorError> {
        let conversations = catalog::scan_conversations(&self.paths.conversations_root)?;

        let mut report = StopReport::default();
        for selector in &cfg.selectors {
            let matched = match_selector(selector, &conversations);
            if matched.is_empty() {
                tracing::warn!(
                    "invalid conversation index specified \"{selector}\", request ignored"
                );
                report.unmatched_selectors.push(selector.clone());
                continue;
            }
            for conversation in matched {
                for bot in self.conversation_bots(conversation)? {
                    let dir = self.paths.bot_dir(conversation, &bot.name);
                    match self.registry.terminate(&dir) {
                        Ok(TerminateOutcome::Signalled(pid)) => {
                            tracing::info!("sent SIGTERM to pid {pid} for \"{}\"", bot.name);
                            report.terminated += 1;
                        }
                        Ok(TerminateOutcome::NotTracked) => {
                            tracing::debug!("no record for \"{}\", nothing to stop", bot.name);
                        }
                        Err(err) => {
                            tracing::warn!("failed to stop \"{}\": {err}", bot.name);
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Wipe all persisted injection state. Irreversible.
    pub fn clear(&self) -> Result<(), OrchestratorError> {
        self.registry.clear_all()?;
        tracing::info!("cleared injection state");
        Ok(())
    }

    fn conversation_bots(
        &self,
        conversation: &str,
    ) -> Result<Vec<crate::catalog::BotDefinition>, OrchestratorError> {
        let dir = self.paths.conversations_root.join(conversation);
        Ok(catalog::load_definitions(&dir)?)
    }

    /// Build, spawn and record one worker. The pid is persisted right
    /// after spawn so a later stop run can find it.
    fn launch_bot(
        &self,
        cfg: &InjectionConfig,
        conversation: &str,
        bot: &crate::catalog::BotDefinition,
        rng: &mut impl Rng,
    ) -> Result<tokio::process::Child, LaunchError> {
        let plan = command::build_launch(cfg, &self.paths, conversation, bot, rng)?;
        std::fs::create_dir_all(&plan.workdir).map_err(LaunchError::Workdir)?;

        let child = tokio::process::Command::new(&plan.program)
            .args(&plan.args)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: plan.program.display().to_string(),
                source,
            })?;

        match child.id() {
            Some(pid) => {
                if let Err(err) = self.registry.record(&plan.workdir, pid) {
                    tracing::warn!(
                        "could not record pid {pid} for \"{}\": {err}; \
                         a later stop will not find this bot",
                        plan.bot_name
                    );
                }
            }
            None => tracing::warn!("worker for \"{}\" exited before it was recorded", plan.bot_name),
        }

        Ok(child)
    }

}

/// Per-bot launch failures; isolated to the bot, never fatal to the batch.
#[derive(Debug, thiserror::Error)]
enum LaunchError {
    #[error(transparent)]
    Command(#[from] command::CommandError),

    #[error("cannot create working directory: {0}")]
    Workdir(std::io::Error),

    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Pick the conversations a selector matches, in catalog order.
pub fn match_selector<'a>(selector: &str, conversations: &'a [String]) -> Vec<&'a str> {
    conversations
        .iter()
        .filter(|c| c.starts_with(selector))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_selection_clear_wins() {
        assert_eq!(RunMode::from_flags(false, false), RunMode::Start);
        assert_eq!(RunMode::from_flags(true, false), RunMode::Stop);
        assert_eq!(RunMode::from_flags(false, true), RunMode::Clear);
        assert_eq!(RunMode::from_flags(true, true), RunMode::Clear);
    }

    #[test]
    fn selector_matches_by_prefix() {
        let convs = vec![
            "00_intro".to_string(),
            "01_outro".to_string(),
            "02_extra".to_string(),
        ];
        assert_eq!(match_selector("00", &convs), vec!["00_intro"]);
        assert_eq!(match_selector("0", &convs), vec![
            "00_intro", "01_outro", "02_extra"
        ]);
        assert!(match_selector("09", &convs).is_empty());
    }

    fn unused_paths(tmp: &tempfile::TempDir) -> WorkerPaths {
        WorkerPaths {
            binary: "true".into(),
            registry_root: tmp.path().join("state"),
            conversations_root: tmp.path().join("conversations"),
        }
    }

    #[test]
    fn clear_wipes_registry_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = unused_paths(&tmp);
        let registry = crate::registry::FsProcessRegistry::new(paths.registry_root.clone());
        std::fs::create_dir_all(paths.registry_root.join("00_intro/alice")).unwrap();

        let orch = Orchestrator::new(paths.clone(), registry);
        orch.clear().unwrap();
        assert!(!paths.registry_root.exists());
        // Idempotent.
        orch.clear().unwrap();
    }
}
