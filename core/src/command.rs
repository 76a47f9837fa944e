//! Worker invocation construction.
//!
//! Turns one bot definition into the exact argv the worker binary expects.
//! The argument grammar is order-sensitive as far as this crate is
//! concerned so that launches are reproducible; the worker itself parses
//! flags positionally-insensitively.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::catalog::BotDefinition;
use crate::config::{InjectionConfig, SpatialStyle};
use crate::identity::{self, InitPos};

/// Worker log verbosity passed on every launch.
const WORKER_LOG_LEVEL: &str = "3";

/// Name of the worker executable, relative to its build directory.
const WORKER_BINARY: &str = "cpp_injection_demo";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("bot \"{bot}\" has no media field; cannot start it")]
    MissingMedia { bot: String },

    #[error("media file {path} does not exist")]
    MediaNotFound { path: PathBuf },

    #[error("identity encoding failed: {0}")]
    Identity(#[from] crate::identity::IdentityError),
}

/// Stream kind inferred from a media file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio-only asset (`.aac`, `.wav`, `.m4a`).
    Audio,
    /// Everything else carries both audio and video.
    AudioVideo,
}

impl MediaKind {
    pub fn classify(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("aac" | "wav" | "m4a") => Self::Audio,
            _ => Self::AudioVideo,
        }
    }

    /// The `-m` flag value the worker expects.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Audio => "A",
            Self::AudioVideo => "AV",
        }
    }
}

/// Resolved filesystem locations, computed once at startup instead of
/// living in ambient globals.
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    /// The worker executable to spawn.
    pub binary: PathBuf,
    /// Registry root; each bot gets `<root>/<conversation>/<name>`.
    pub registry_root: PathBuf,
    /// Root folder holding per-conversation assets.
    pub conversations_root: PathBuf,
}

impl WorkerPaths {
    /// Defaults matching the demo layout: the worker sits under `src/`
    /// (with the `RelWithDebInfo` build directory on windows), assets
    /// under `conversations/`, state under the per-user temp dir.
    pub fn discover() -> Self {
        let binary = if cfg!(windows) {
            PathBuf::from("src").join("RelWithDebInfo").join(WORKER_BINARY)
        } else {
            PathBuf::from("src").join(WORKER_BINARY)
        };
        Self {
            binary,
            registry_root: crate::default_registry_root(),
            conversations_root: PathBuf::from(crate::CONVERSATIONS_DIR),
        }
    }

    /// Working directory for one bot, also its registry key.
    pub fn bot_dir(&self, conversation: &str, bot_name: &str) -> PathBuf {
        self.registry_root.join(conversation).join(bot_name)
    }
}

/// Everything needed to spawn one worker process.
#[derive(Debug, Clone)]
pub struct BotLaunchPlan {
    pub conversation: String,
    pub bot_name: String,
    /// Per-bot working directory, created before spawn and used as the
    /// registry key for later stops.
    pub workdir: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Build the launch plan for one bot of one conversation.
///
/// Resolves the media path relative to the conversation folder, classifies
/// the stream kind, derives the external identity, and lays out the argv
/// in the reference order.
pub fn build_launch(
    cfg: &InjectionConfig,
    paths: &WorkerPaths,
    conversation: &str,
    bot: &BotDefinition,
    rng: &mut impl Rng,
) -> Result<BotLaunchPlan, CommandError> {
    let media = bot.media.as_deref().ok_or_else(|| CommandError::MissingMedia {
        bot: bot.name.clone(),
    })?;
    let media_path = paths.conversations_root.join(conversation).join(media);
    if !media_path.is_file() {
        return Err(CommandError::MediaNotFound { path: media_path });
    }
    let kind = MediaKind::classify(&media_path);

    let workdir = paths.bot_dir(conversation, &bot.name);
    let ext_id = identity::encode(
        InitPos {
            x: bot.x,
            y: bot.y,
            z: bot.z,
            r: bot.r,
        },
        bot.t1.as_deref(),
        bot.t2.as_deref(),
        rng,
    )?;

    let mut args = vec![
        "-c".to_string(),
        cfg.conf_alias.clone(),
        "-k".to_string(),
        cfg.access_token.clone(),
        "-l".to_string(),
        WORKER_LOG_LEVEL.to_string(),
        "-ld".to_string(),
        workdir.to_string_lossy().to_string(),
        "-initial-spatial-position".to_string(),
        format!("{};{};{}", bot.x, bot.y, bot.z),
        "-initial-yaw-rotation".to_string(),
        format!("{}", bot.r),
        "-initial-scale".to_string(),
        cfg.scale.to_string(),
        "-u".to_string(),
        bot.name.clone(),
        "-e".to_string(),
        ext_id,
        "-p".to_string(),
        "user".to_string(),
        "-m".to_string(),
        kind.flag().to_string(),
        "--enable-media-io".to_string(),
        "-f".to_string(),
        media_path.to_string_lossy().to_string(),
        "-loop".to_string(),
    ];
    // The spatial flag is omitted entirely when the style is `none`.
    if cfg.style != SpatialStyle::None {
        args.push("-spatial".to_string());
        args.push(cfg.style.as_str().to_string());
    }
    args.extend([
        "-initial-right".to_string(),
        cfg.right.to_string(),
        "-initial-up".to_string(),
        cfg.up.to_string(),
        "-initial-forward".to_string(),
        cfg.forward.to_string(),
    ]);

    Ok(BotLaunchPlan {
        conversation: conversation.to_string(),
        bot_name: bot.name.clone(),
        workdir,
        program: paths.binary.clone(),
        args,
    })
}
