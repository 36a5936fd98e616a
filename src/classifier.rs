// Keyword/pattern heuristic that tags processes and services as domain-related.

use crate::models::{ProcessRecord, ServiceRecord};
use regex::{RegexSet, RegexSetBuilder};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "python",
    "python3",
    "llama",
    "gpt",
    "bert",
    "transformer",
    "pytorch",
    "tensorflow",
    "onnxruntime",
    "huggingface",
    "langchain",
    "llm",
    "openai",
    "mistral",
    "vicuna",
    "falcon",
];

pub const DEFAULT_PATTERNS: &[&str] = &[
    r"python.*torch",
    r"python.*tensorflow",
    r"python.*transformers",
    r"python.*huggingface",
    r"python.*llama",
    r"python.*bert",
    r"python.*gpt",
    r"python.*t5",
    r"python.*whisper",
    r"llama.cpp",
    r"ggml",
    r"ollama",
    r"text-generation-server",
    r"nvidia-smi",
];

/// Extensions of model weight files recognised in open-file hints.
pub const MODEL_FILE_EXTENSIONS: &[&str] =
    &[".bin", ".gguf", ".ggml", ".pt", ".pth", ".safetensors"];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid classifier pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One piece of evidence about an entry. Variants are listed in evaluation
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal<'a> {
    /// Process or container name.
    Name(&'a str),
    CommandLine(&'a str),
    /// One `KEY=value` entry.
    Environment(&'a str),
    /// Path of a file the process holds open.
    OpenFile(&'a str),
    /// Image name, label key or label value.
    Label(&'a str),
}

impl Signal<'_> {
    fn rank(&self) -> u8 {
        match self {
            Signal::Name(_) => 0,
            Signal::CommandLine(_) => 1,
            Signal::Environment(_) => 2,
            Signal::OpenFile(_) => 3,
            Signal::Label(_) => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    keywords: Vec<String>,
    patterns: RegexSet,
}

impl Classifier {
    /// Default keyword and pattern sets extended with the given extras.
    pub fn new(extra_keywords: &[String], extra_patterns: &[String]) -> Result<Self, ClassifierError> {
        let keywords = DEFAULT_KEYWORDS
            .iter()
            .map(|k| k.to_string())
            .chain(extra_keywords.iter().map(|k| k.to_lowercase()))
            .filter(|k| !k.is_empty())
            .collect();
        let patterns = RegexSetBuilder::new(
            DEFAULT_PATTERNS
                .iter()
                .copied()
                .chain(extra_patterns.iter().map(String::as_str)),
        )
        .case_insensitive(true)
        .build()?;
        Ok(Self { keywords, patterns })
    }

    /// True as soon as any signal matches, evaluated name first, then command
    /// line, environment, open files and labels. Empty signals never match.
    pub fn is_related(&self, signals: &[Signal<'_>]) -> bool {
        let mut ordered: Vec<&Signal<'_>> = signals.iter().collect();
        ordered.sort_by_key(|s| s.rank());
        ordered.into_iter().any(|s| self.matches(s))
    }

    fn matches(&self, signal: &Signal<'_>) -> bool {
        match *signal {
            Signal::Name(s) | Signal::CommandLine(s) => {
                !s.is_empty() && (self.contains_keyword(s) || self.patterns.is_match(s))
            }
            Signal::Environment(s) | Signal::Label(s) => !s.is_empty() && self.contains_keyword(s),
            Signal::OpenFile(s) => is_model_file(s),
        }
    }

    fn contains_keyword(&self, s: &str) -> bool {
        let lower = s.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            patterns: RegexSetBuilder::new(DEFAULT_PATTERNS)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|_| RegexSet::empty()),
        }
    }
}

/// Basename mentions "model" and carries a weight-file extension.
fn is_model_file(path: &str) -> bool {
    let Some(base) = Path::new(path).file_name().and_then(|b| b.to_str()) else {
        return false;
    };
    let base = base.to_lowercase();
    base.contains("model") && MODEL_FILE_EXTENSIONS.iter().any(|ext| base.ends_with(ext))
}

/// Entries that can be classified.
pub trait Classify {
    fn is_related_by(&self, classifier: &Classifier) -> bool;
}

impl Classify for ProcessRecord {
    fn is_related_by(&self, classifier: &Classifier) -> bool {
        let cmdline = self.cmdline.join(" ");
        let mut signals = Vec::with_capacity(2 + self.environment.len() + self.open_files.len());
        signals.push(Signal::Name(&self.name));
        signals.push(Signal::CommandLine(&cmdline));
        signals.extend(self.environment.iter().map(|e| Signal::Environment(e)));
        signals.extend(self.open_files.iter().map(|f| Signal::OpenFile(f)));
        classifier.is_related(&signals)
    }
}

impl Classify for ServiceRecord {
    fn is_related_by(&self, classifier: &Classifier) -> bool {
        let mut signals = vec![Signal::Name(&self.name)];
        if let Some(command) = &self.command {
            signals.push(Signal::CommandLine(command));
        }
        signals.extend(self.environment.iter().map(|e| Signal::Environment(e)));
        if let Some(image) = &self.image {
            signals.push(Signal::Label(image));
        }
        signals.extend(
            self.labels
                .iter()
                .flat_map(|(k, v)| [Signal::Label(k), Signal::Label(v)]),
        );
        classifier.is_related(&signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessMemory, ServiceKind};

    fn process(name: &str, cmdline: &[&str]) -> ProcessRecord {
        ProcessRecord {
            pid: 42,
            ppid: None,
            name: name.into(),
            cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
            status: "running".into(),
            username: None,
            start_time: 0,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            memory: ProcessMemory { rss: 0, vms: 0 },
            num_threads: None,
            cwd: None,
            environment: vec![],
            open_files: vec![],
            io_counters: None,
            is_related: false,
        }
    }

    #[test]
    fn keyword_in_name_is_case_insensitive() {
        let c = Classifier::default();
        assert!(c.is_related(&[Signal::Name("LLaMA-server")]));
        assert!(c.is_related(&[Signal::Name("OpenAI-proxy")]));
        assert!(!c.is_related(&[Signal::Name("nginx")]));
    }

    #[test]
    fn pattern_matches_command_line() {
        let c = Classifier::default();
        assert!(c.is_related(&[Signal::Name("node"), Signal::CommandLine("text-generation-server")]));
        assert!(c.is_related(&[Signal::CommandLine("./main -m ggml-q4.bin")]));
        assert!(!c.is_related(&[Signal::Name("bash"), Signal::CommandLine("-c ls /tmp")]));
    }

    #[test]
    fn patterns_do_not_apply_to_environment_or_labels() {
        let c = Classifier::default();
        // "ggml" and "nvidia-smi" are patterns, not keywords
        assert!(!c.is_related(&[Signal::Environment("LIB=/opt/ggml")]));
        assert!(!c.is_related(&[Signal::Label("nvidia-smi")]));
        assert!(c.is_related(&[Signal::CommandLine("/usr/bin/nvidia-smi -l 1")]));
        assert!(c.is_related(&[Signal::Environment("MODEL=mistral-7b")]));
        assert!(c.is_related(&[Signal::Label("ghcr.io/huggingface/tgi")]));
    }

    #[test]
    fn open_file_needs_model_basename_and_weight_extension() {
        let c = Classifier::default();
        assert!(c.is_related(&[Signal::OpenFile("/data/my-Model-7b.GGUF")]));
        assert!(c.is_related(&[Signal::OpenFile("/srv/pytorch_model.bin")]));
        assert!(!c.is_related(&[Signal::OpenFile("/var/lib/app/data.bin")]));
        assert!(!c.is_related(&[Signal::OpenFile("/models/readme.txt")]));
        // directory named model, basename without it
        assert!(!c.is_related(&[Signal::OpenFile("/model/weights.pt")]));
    }

    #[test]
    fn empty_signals_never_match() {
        let c = Classifier::default();
        assert!(!c.is_related(&[]));
        assert!(!c.is_related(&[
            Signal::Name(""),
            Signal::CommandLine(""),
            Signal::Environment(""),
            Signal::OpenFile(""),
            Signal::Label(""),
        ]));
    }

    #[test]
    fn name_match_wins_regardless_of_signal_order() {
        let c = Classifier::default();
        let signals = [
            Signal::Label("plain"),
            Signal::Environment("\u{0}\u{1}garbage"),
            Signal::Name("vicuna-worker"),
        ];
        assert!(c.is_related(&signals));
        assert_eq!(c.is_related(&signals), c.is_related(&signals));
    }

    #[test]
    fn extra_keywords_and_patterns_extend_defaults() {
        let c = Classifier::new(&["Diffusion".into()], &[r"^triton\b".into()]).unwrap();
        assert!(c.is_related(&[Signal::Name("stable-diffusion-webui")]));
        assert!(c.is_related(&[Signal::CommandLine("triton serve")]));
        assert!(c.is_related(&[Signal::Name("gpt-runner")]));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(Classifier::new(&[], &["(unclosed".into()]).is_err());
    }

    #[test]
    fn process_command_line_is_matched_as_one_string() {
        let c = Classifier::new(&[], &[r"serve.*--model".into()]).unwrap();
        let p = process("worker", &["serve", "--port", "80", "--model", "x"]);
        assert!(p.is_related_by(&c));
        let p = process("worker", &["serve", "--port", "80"]);
        assert!(!p.is_related_by(&c));
    }

    #[test]
    fn process_with_model_file_is_related() {
        let c = Classifier::default();
        let mut p = process("server", &["./server", "--port", "8080"]);
        assert!(!p.is_related_by(&c));
        p.open_files = vec!["/weights/model-q8.safetensors".into()];
        assert!(p.is_related_by(&c));
    }

    #[test]
    fn service_image_and_labels_are_lowest_priority_hints() {
        let c = Classifier::default();
        let mut s = ServiceRecord::new("api", ServiceKind::Docker, "running");
        assert!(!s.is_related_by(&c));
        s.labels.insert("com.example.stack".into(), "langchain".into());
        assert!(s.is_related_by(&c));

        let mut s = ServiceRecord::new("api", ServiceKind::Docker, "running");
        s.image = Some("registry/tensorflow-serving:2".into());
        assert!(s.is_related_by(&c));
    }
}
