use crate::git::CompareTarget;
use color_eyre::eyre::{Result, WrapErr};
use dirs::config_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const APP_NAME: &str = "gutterline";
pub const PROJECT_SETTINGS_FILE: &str = ".gutterline.json";
pub const MIN_DEBOUNCE_DELAY_MS: u64 = 200;
pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 1000;
pub const DEFAULT_STATUS_BAR_TEXT: &str =
    "{repo}/{branch}[, Comparing against {compare}][, {inserted}+][, {deleted}-][, {modified}≠]";
pub const DEFAULT_LINE_ANNOTATION_TEXT: &str = "{line_author}, {line_author_age} · {line_summary}";

/// Which whitespace differences the diff ignores.
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub enum IgnoreWhitespace {
    #[default]
    None,
    Cr,
    Eol,
    Space,
    All,
}

impl IgnoreWhitespace {
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            IgnoreWhitespace::None => None,
            IgnoreWhitespace::Cr => Some("--ignore-cr-at-eol"),
            IgnoreWhitespace::Eol => Some("--ignore-space-at-eol"),
            IgnoreWhitespace::Space => Some("--ignore-space-change"),
            IgnoreWhitespace::All => Some("-w"),
        }
    }
}

impl<'de> Deserialize<'de> for IgnoreWhitespace {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        IgnoreWhitespace::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for IgnoreWhitespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(IgnoreWhitespace::None),
            "cr" => Ok(IgnoreWhitespace::Cr),
            "eol" => Ok(IgnoreWhitespace::Eol),
            "space" => Ok(IgnoreWhitespace::Space),
            "all" => Ok(IgnoreWhitespace::All),
            _ => Err(format!(
                "Invalid ignore_whitespace: {s}. Must be one of none, cr, eol, space, all"
            )),
        }
    }
}

impl std::fmt::Display for IgnoreWhitespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreWhitespace::None => write!(f, "none"),
            IgnoreWhitespace::Cr => write!(f, "cr"),
            IgnoreWhitespace::Eol => write!(f, "eol"),
            IgnoreWhitespace::Space => write!(f, "space"),
            IgnoreWhitespace::All => write!(f, "all"),
        }
    }
}

/// Diff algorithm passed to git.
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub enum DiffAlgorithm {
    #[default]
    Minimal,
    Patience,
    Histogram,
}

impl DiffAlgorithm {
    pub fn flag(&self) -> &'static str {
        match self {
            DiffAlgorithm::Minimal => "--minimal",
            DiffAlgorithm::Patience => "--patience",
            DiffAlgorithm::Histogram => "--histogram",
        }
    }
}

impl<'de> Deserialize<'de> for DiffAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DiffAlgorithm::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for DiffAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(DiffAlgorithm::Minimal),
            "patience" => Ok(DiffAlgorithm::Patience),
            "histogram" => Ok(DiffAlgorithm::Histogram),
            _ => Err(format!(
                "Invalid diff_algorithm: {s}. Must be one of minimal, patience, histogram"
            )),
        }
    }
}

impl std::fmt::Display for DiffAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffAlgorithm::Minimal => write!(f, "minimal"),
            DiffAlgorithm::Patience => write!(f, "patience"),
            DiffAlgorithm::Histogram => write!(f, "histogram"),
        }
    }
}

/// One layer of settings. Every key is optional so layers can be stacked;
/// unknown keys in the JSON are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    pub enable: Option<bool>,
    pub live_mode: Option<bool>,
    pub focus_change_mode: Option<bool>,
    pub debounce_delay: Option<u64>,
    pub compare_against: Option<String>,
    pub next_prev_change_wrap: Option<bool>,
    pub ignore_whitespace: Option<IgnoreWhitespace>,
    pub diff_algorithm: Option<DiffAlgorithm>,
    pub show_status_bar_text: Option<bool>,
    pub status_bar_text: Option<String>,
    pub show_markers_on_untracked_file: Option<bool>,
    pub show_line_annotation: Option<bool>,
    pub line_annotation_text: Option<String>,
    pub show_in_minimap: Option<u32>,
    pub git_binary: Option<String>,
    pub tab_width: Option<usize>,
    pub debug: Option<bool>,
}

impl Settings {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// User preferences from the platform config directory.
    pub fn load_user() -> Result<Self> {
        Self::load_from(&Self::user_settings_path())
    }

    /// Project settings stored at the root of a working tree.
    pub fn load_project(worktree_root: &Path) -> Result<Self> {
        Self::load_from(&worktree_root.join(PROJECT_SETTINGS_FILE))
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        debug!("Loading settings from {path:?}");
        let content = fs::read_to_string(path)?;
        Self::from_json(&content).wrap_err_with(|| format!("Invalid settings file {path:?}"))
    }

    fn user_settings_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("settings.json")
    }

    /// Fill every unset key of `self` from `lower`.
    pub fn overlay(&self, lower: &Settings) -> Settings {
        Settings {
            enable: self.enable.or(lower.enable),
            live_mode: self.live_mode.or(lower.live_mode),
            focus_change_mode: self.focus_change_mode.or(lower.focus_change_mode),
            debounce_delay: self.debounce_delay.or(lower.debounce_delay),
            compare_against: self
                .compare_against
                .clone()
                .or_else(|| lower.compare_against.clone()),
            next_prev_change_wrap: self.next_prev_change_wrap.or(lower.next_prev_change_wrap),
            ignore_whitespace: self.ignore_whitespace.or(lower.ignore_whitespace),
            diff_algorithm: self.diff_algorithm.or(lower.diff_algorithm),
            show_status_bar_text: self.show_status_bar_text.or(lower.show_status_bar_text),
            status_bar_text: self
                .status_bar_text
                .clone()
                .or_else(|| lower.status_bar_text.clone()),
            show_markers_on_untracked_file: self
                .show_markers_on_untracked_file
                .or(lower.show_markers_on_untracked_file),
            show_line_annotation: self.show_line_annotation.or(lower.show_line_annotation),
            line_annotation_text: self
                .line_annotation_text
                .clone()
                .or_else(|| lower.line_annotation_text.clone()),
            show_in_minimap: self.show_in_minimap.or(lower.show_in_minimap),
            git_binary: self.git_binary.clone().or_else(|| lower.git_binary.clone()),
            tab_width: self.tab_width.or(lower.tab_width),
            debug: self.debug.or(lower.debug),
        }
    }

    /// The view-level layer built from command-line flags.
    pub fn from_args(args: &Args) -> Self {
        Self {
            debug: if args.debug { Some(true) } else { None },
            compare_against: args.compare_against.clone(),
            ignore_whitespace: args.ignore_whitespace,
            diff_algorithm: args.diff_algorithm,
            debounce_delay: args.debounce_delay,
            git_binary: args.git_binary.clone(),
            show_markers_on_untracked_file: if args.show_untracked {
                Some(true)
            } else {
                None
            },
            ..Default::default()
        }
    }
}

/// Read-only merge of view, project and user settings over the defaults.
#[derive(Debug, Clone, Default)]
pub struct SettingsView {
    layers: Vec<Settings>,
}

impl SettingsView {
    /// `layers` are ordered by decreasing precedence.
    pub fn new(layers: Vec<Settings>) -> Self {
        Self { layers }
    }

    pub fn from_layers(view: Settings, project: Settings, user: Settings) -> Self {
        Self::new(vec![view, project, user])
    }

    /// Collapse every layer into one `Settings`.
    pub fn flatten(&self) -> Settings {
        self.layers
            .iter()
            .fold(Settings::default(), |merged, layer| merged.overlay(layer))
    }

    fn pick<T>(&self, key: impl Fn(&Settings) -> Option<T>) -> Option<T> {
        self.layers.iter().find_map(key)
    }

    pub fn enable(&self) -> bool {
        self.pick(|s| s.enable).unwrap_or(true)
    }

    pub fn live_mode(&self) -> bool {
        self.pick(|s| s.live_mode).unwrap_or(true)
    }

    pub fn focus_change_mode(&self) -> bool {
        self.pick(|s| s.focus_change_mode).unwrap_or(true)
    }

    /// Debounce window, never below 200 ms.
    pub fn debounce_delay(&self) -> Duration {
        let millis = self
            .pick(|s| s.debounce_delay)
            .unwrap_or(DEFAULT_DEBOUNCE_DELAY_MS)
            .max(MIN_DEBOUNCE_DELAY_MS);
        Duration::from_millis(millis)
    }

    pub fn compare_against(&self) -> CompareTarget {
        self.pick(|s| s.compare_against.clone())
            .map(|value| CompareTarget::parse(&value))
            .unwrap_or_default()
    }

    pub fn next_prev_change_wrap(&self) -> bool {
        self.pick(|s| s.next_prev_change_wrap).unwrap_or(true)
    }

    pub fn ignore_whitespace(&self) -> IgnoreWhitespace {
        self.pick(|s| s.ignore_whitespace).unwrap_or_default()
    }

    pub fn diff_algorithm(&self) -> DiffAlgorithm {
        self.pick(|s| s.diff_algorithm).unwrap_or_default()
    }

    pub fn show_status_bar_text(&self) -> bool {
        self.pick(|s| s.show_status_bar_text).unwrap_or(true)
    }

    pub fn status_bar_text(&self) -> String {
        self.pick(|s| s.status_bar_text.clone())
            .unwrap_or_else(|| DEFAULT_STATUS_BAR_TEXT.to_string())
    }

    pub fn show_markers_on_untracked_file(&self) -> bool {
        self.pick(|s| s.show_markers_on_untracked_file)
            .unwrap_or(false)
    }

    pub fn show_line_annotation(&self) -> bool {
        self.pick(|s| s.show_line_annotation).unwrap_or(false)
    }

    pub fn line_annotation_text(&self) -> String {
        self.pick(|s| s.line_annotation_text.clone())
            .unwrap_or_else(|| DEFAULT_LINE_ANNOTATION_TEXT.to_string())
    }

    /// Minimap marker width in pixels; 0 hides minimap markers.
    pub fn show_in_minimap(&self) -> u32 {
        self.pick(|s| s.show_in_minimap).unwrap_or(1)
    }

    pub fn git_binary(&self) -> String {
        self.pick(|s| s.git_binary.clone())
            .unwrap_or_else(|| "git".to_string())
    }

    pub fn tab_width(&self) -> usize {
        self.pick(|s| s.tab_width).unwrap_or(4).max(1)
    }

    pub fn debug(&self) -> bool {
        self.pick(|s| s.debug).unwrap_or(false)
    }
}

/// Kind of compare-target list to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Branches,
    Tags,
    Commits,
    FileCommits,
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "branches" => Ok(TargetKind::Branches),
            "tags" => Ok(TargetKind::Tags),
            "commits" => Ok(TargetKind::Commits),
            "file-commits" | "file_commits" => Ok(TargetKind::FileCommits),
            _ => Err(format!(
                "Invalid target kind: {s}. Must be branches, tags, commits or file-commits"
            )),
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "gutterline", about = "Track line changes of a file against a git revision")]
pub struct Args {
    #[arg(short, long, help = "Print version information and exit")]
    pub version: bool,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(
        long,
        global = true,
        help = "Revision to compare against (HEAD, branch, tag, origin/<branch> or commit)"
    )]
    pub compare_against: Option<String>,

    #[arg(long, global = true, help = "Whitespace to ignore: none, cr, eol, space, all")]
    pub ignore_whitespace: Option<IgnoreWhitespace>,

    #[arg(long, global = true, help = "Diff algorithm: minimal, patience, histogram")]
    pub diff_algorithm: Option<DiffAlgorithm>,

    #[arg(long, global = true, help = "Debounce delay in milliseconds (minimum 200)")]
    pub debounce_delay: Option<u64>,

    #[arg(long, global = true, help = "Path or name of the git binary")]
    pub git_binary: Option<String>,

    #[arg(long, global = true, help = "Mark every line of untracked files")]
    pub show_untracked: bool,

    #[arg(long, global = true, help = "Encoding files are read in, e.g. \"Western (Windows 1252)\"")]
    pub encoding: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Print inserted, modified and deleted lines
    Diff {
        file: PathBuf,
        #[arg(long, help = "Print JSON instead of text")]
        json: bool,
    },
    /// Print the status line
    Status { file: PathBuf },
    /// Print the change popup for one line
    Popup {
        file: PathBuf,
        #[arg(long, help = "1-based line number")]
        line: usize,
    },
    /// List compare targets
    Targets {
        file: PathBuf,
        #[arg(long, default_value = "branches", help = "branches, tags, commits or file-commits")]
        kind: TargetKind,
    },
    /// Keep watching the file and print every update
    Watch {
        file: PathBuf,
        #[arg(long, default_value_t = 500, help = "Polling interval in milliseconds")]
        poll_interval: u64,
    },
}
