//! # Stack Inspector
//!
//! Walks the live call stack of the current thread and classifies frames
//! into application frames and runtime/framework noise. The walk must run on
//! the thread that is panicking, which is why [`crate::hook`] calls [`walk`]
//! from inside the panic hook while the stack is still intact.

use serde::{Deserialize, Serialize};

use crate::types::{FaultDiagnosis, FrameDescriptor};

/// Upper bound on captured frames per walk
pub const MAX_FRAMES: usize = 32;

/// Default number of innermost frames dropped before collection starts
pub const DEFAULT_SKIP_FRAMES: usize = 4;

const INSPECTOR_SOURCE: &str = file!();

/// Substring patterns used to classify frames by source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePatterns {
    /// Standard library and unwinding machinery. Never reported as origin.
    pub runtime: Vec<String>,
    /// The web framework and async runtime around the handler
    pub framework: Vec<String>,
}

impl FramePatterns {
    pub fn default_runtime() -> Vec<String> {
        [
            "/rustc/",
            "/library/std/",
            "/library/core/",
            "/library/alloc/",
            "/library/panic_unwind/",
            "/backtrace-0.",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect()
    }

    pub fn default_framework() -> Vec<String> {
        [
            "/axum-",
            "/tower-",
            "/hyper-",
            "/tokio-",
            "/futures-",
            "/http-body-",
            concat!(env!("CARGO_PKG_NAME"), "/src/"),
            concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"), "/src/"),
        ]
        .iter()
        .map(|p| p.to_string())
        .collect()
    }

    /// Frames without a source file are not attributable and count as runtime
    pub fn is_runtime(&self, file: &str) -> bool {
        file.is_empty()
            || is_capture_machinery(file)
            || self.runtime.iter().any(|p| file.contains(p.as_str()))
    }

    pub fn is_framework(&self, file: &str) -> bool {
        self.framework.iter().any(|p| file.contains(p.as_str()))
    }
}

impl Default for FramePatterns {
    fn default() -> Self {
        Self {
            runtime: Self::default_runtime(),
            framework: Self::default_framework(),
        }
    }
}

// The hook and the walker sit innermost on every captured stack.
fn is_capture_machinery(file: &str) -> bool {
    file.ends_with(INSPECTOR_SOURCE) || file.ends_with(crate::hook::HOOK_SOURCE)
}

/// Walks the current thread's stack.
///
/// Drops the `skip` innermost raw frames, then collects at most
/// [`MAX_FRAMES`] frames. Inlined calls resolve to one descriptor each; the
/// bound applies to descriptors as well. Unresolvable frames are dropped.
pub fn walk(skip: usize) -> Vec<FrameDescriptor> {
    let mut raw = Vec::with_capacity(MAX_FRAMES);
    let mut seen = 0usize;
    backtrace::trace(|frame| {
        seen += 1;
        if seen > skip {
            raw.push(frame.clone());
        }
        raw.len() < MAX_FRAMES
    });

    let mut frames = Vec::with_capacity(raw.len());
    for frame in &raw {
        backtrace::resolve_frame(frame, |symbol| {
            if frames.len() >= MAX_FRAMES {
                return;
            }
            frames.push(FrameDescriptor {
                file: symbol
                    .filename()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
                line: symbol.lineno().unwrap_or(0),
                function: symbol
                    .name()
                    .map(|name| format!("{:#}", name))
                    .unwrap_or_default(),
            });
        });
    }
    frames
}

/// Builds a diagnosis from frames ordered inner to outer.
///
/// A frame is kept when `include_runtime` is set or when it matches neither
/// runtime nor framework patterns. The origin is the first kept frame that
/// is not runtime; failing that, the first kept frame.
pub fn diagnose<I>(frames: I, include_runtime: bool, patterns: &FramePatterns) -> FaultDiagnosis
where
    I: IntoIterator<Item = FrameDescriptor>,
{
    let mut diagnosis = FaultDiagnosis::default();
    let mut origin_found = false;

    for frame in frames {
        let runtime = patterns.is_runtime(&frame.file);
        let relevant = include_runtime || (!runtime && !patterns.is_framework(&frame.file));
        if !relevant {
            continue;
        }

        if !origin_found && !runtime {
            diagnosis.file = frame.file.clone();
            diagnosis.line = frame.line;
            diagnosis.function = frame.function.clone();
            origin_found = true;
        }
        diagnosis.stack.push(frame);
    }

    if !origin_found {
        if let Some(first) = diagnosis.stack.first() {
            diagnosis.file = first.file.clone();
            diagnosis.line = first.line;
            diagnosis.function = first.function.clone();
        }
    }

    diagnosis
}

/// Walks and classifies the caller's stack in one step.
///
/// For use outside a panic; faults caught by the interceptor are walked by
/// the panic hook instead.
pub fn capture_frames(skip: usize, include_runtime: bool, patterns: &FramePatterns) -> FaultDiagnosis {
    diagnose(walk(skip), include_runtime, patterns)
}
