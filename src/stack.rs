//! Call stack capture for recovered panics.
//!
//! [`StackCapture`] walks the current thread's stack with the `backtrace`
//! crate and renders one line per frame:
//!
//! ```text
//! errorcontext::recoverer::Recoverer<E>::format at src/recoverer.rs:212
//! my_app::worker::run::{{closure}} at src/worker.rs:48
//! core::ops::function::FnOnce::call_once at [..]/core/src/ops/function.rs:250
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Disables frame filtering
//! - `ERRORCONTEXT_BACKTRACE` - Comma-separated options:
//!   - `full` - Disables frame filtering
//!   - `full_paths` - Show full file paths instead of shortened ones
//!
//! # Path privacy
//!
//! Paths that are not recognized as belonging to the Rust source tree, the
//! cargo registry or the current directory are printed verbatim. Use the
//! `--remap-path-prefix` option of `rustc` if that is a concern.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

/// Settings for capturing the call stack of a recovered panic.
///
/// # Examples
///
/// ```
/// use errorcontext::StackCapture;
///
/// let capture = StackCapture {
///     max_frame_count: 20,
///     ..StackCapture::DEFAULT
/// };
/// let stack = capture.capture();
/// assert!(!stack.is_empty());
/// assert!(stack.len() <= 20);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackCapture {
    /// Maximum number of frames to capture.
    pub max_frame_count: usize,
    /// Whether to drop the frames of the capture machinery at the start of the
    /// stack and the runtime frames at its end.
    ///
    /// When filtering removes every frame, the unfiltered stack is used.
    pub do_capture_filtering: bool,
    /// Whether to print paths verbatim instead of shortening them.
    pub show_full_path: bool,
}

#[derive(Debug)]
struct ErrorcontextBacktraceEnvOptions {
    filtering_disabled: bool,
    show_full_path: bool,
}

impl ErrorcontextBacktraceEnvOptions {
    fn get() -> &'static Self {
        static ERRORCONTEXT_BACKTRACE_FLAGS: OnceLock<ErrorcontextBacktraceEnvOptions> =
            OnceLock::new();

        ERRORCONTEXT_BACKTRACE_FLAGS.get_or_init(|| {
            let mut filtering_disabled = std::env::var_os("RUST_BACKTRACE")
                .is_some_and(|v| v.eq_ignore_ascii_case("full"));
            let mut show_full_path = false;

            if let Some(var) = std::env::var_os("ERRORCONTEXT_BACKTRACE") {
                for v in var.to_string_lossy().split(',') {
                    if v.eq_ignore_ascii_case("full") {
                        filtering_disabled = true;
                    } else if v.eq_ignore_ascii_case("full_paths") {
                        show_full_path = true;
                    }
                }
            }

            ErrorcontextBacktraceEnvOptions {
                filtering_disabled,
                show_full_path,
            }
        })
    }
}

impl StackCapture {
    /// Filtered capture of at most 100 frames with shortened paths.
    pub const DEFAULT: Self = Self {
        max_frame_count: 100,
        do_capture_filtering: true,
        show_full_path: false,
    };

    /// Creates a [`StackCapture`] configured from the environment.
    ///
    /// The environment is only read once per process.
    pub fn new_from_env() -> Self {
        let env_options = ErrorcontextBacktraceEnvOptions::get();
        Self {
            do_capture_filtering: !env_options.filtering_disabled,
            show_full_path: env_options.show_full_path,
            ..Self::DEFAULT
        }
    }

    /// Captures the current call stack, innermost frame first.
    pub fn capture(&self) -> Vec<String> {
        self.capture_filtered(false)
    }

    /// Captures the stack from inside a panic hook.
    ///
    /// With filtering enabled, the hook and the panic runtime frames are
    /// dropped so that the stack starts at the frame that panicked.
    pub(crate) fn capture_at_panic(&self) -> Vec<String> {
        self.capture_filtered(true)
    }

    fn capture_filtered(&self, in_panic_hook: bool) -> Vec<String> {
        let trim_panic_runtime = in_panic_hook && self.do_capture_filtering;
        let frame_budget = if trim_panic_runtime {
            self.max_frame_count.saturating_add(PANIC_RUNTIME_FRAME_ALLOWANCE)
        } else {
            self.max_frame_count
        };

        let mut frames = capture_frames(frame_budget, self.do_capture_filtering);
        if trim_panic_runtime {
            skip_panic_runtime(&mut frames);
        }
        frames.truncate(self.max_frame_count);
        if frames.is_empty() && self.do_capture_filtering {
            frames = capture_frames(self.max_frame_count, false);
        }
        frames
            .iter()
            .map(|frame| frame.render(self.show_full_path))
            .collect()
    }
}

impl Default for StackCapture {
    fn default() -> Self {
        Self::new_from_env()
    }
}

struct Frame {
    sym_demangled: String,
    frame_path: Option<FramePath>,
    lineno: Option<u32>,
    detected_as_std: bool,
}

struct FramePath {
    raw_path: PathBuf,
    short_path: Option<String>,
    is_std: bool,
}

impl Frame {
    fn render(&self, show_full_path: bool) -> String {
        let mut line = self.sym_demangled.clone();
        if let Some(path) = &self.frame_path {
            line.push_str(" at ");
            match &path.short_path {
                Some(short_path) if !show_full_path => line.push_str(short_path),
                _ => line.push_str(&path.raw_path.to_string_lossy()),
            }
            if let Some(lineno) = self.lineno {
                line.push(':');
                line.push_str(&lineno.to_string());
            }
        }
        line
    }
}

fn is_capture_machinery(sym_demangled: &str) -> bool {
    sym_demangled.starts_with("backtrace::")
        || sym_demangled.contains(" as backtrace::")
        || sym_demangled.starts_with("errorcontext::stack::StackCapture::capture")
        || sym_demangled.starts_with("errorcontext::stack::capture_frames")
        || sym_demangled == "_Unwind_Backtrace"
}

// Frames between a panic hook and the panicking function: the hook itself and
// the std/core panic entry points.
const PANIC_RUNTIME_FRAME_ALLOWANCE: usize = 32;

fn is_panic_runtime(sym_demangled: &str) -> bool {
    sym_demangled.starts_with("std::panicking::")
        || sym_demangled.starts_with("core::panicking::")
        || sym_demangled.starts_with("std::panic::panic_any")
        || sym_demangled.contains("__rust_end_short_backtrace")
        || sym_demangled.contains("rust_begin_unwind")
}

/// Drops everything up to the end of the first run of panic runtime frames.
fn skip_panic_runtime(frames: &mut Vec<Frame>) {
    let Some(start) = frames
        .iter()
        .position(|frame| is_panic_runtime(&frame.sym_demangled))
    else {
        return;
    };
    let end = frames[start..]
        .iter()
        .position(|frame| !is_panic_runtime(&frame.sym_demangled))
        .map_or(frames.len(), |offset| start + offset);
    frames.drain(..end);
}

// Based on the std short backtrace logic: everything below
// `__rust_begin_short_backtrace` belongs to the runtime.
fn capture_frames(max_frame_count: usize, do_capture_filtering: bool) -> Vec<Frame> {
    let cwd = std::env::current_dir().ok();
    let cwd: Option<&Path> = cwd.as_deref();

    #[derive(PartialEq, Eq, Debug)]
    enum CaptureState {
        SkippingCaptureMachinery,
        Capturing,
        Done,
    }
    let mut state = if do_capture_filtering {
        CaptureState::SkippingCaptureMachinery
    } else {
        CaptureState::Capturing
    };
    let mut frames: Vec<Frame> = Vec::new();

    macro_rules! is_done {
        () => {
            frames.len() >= max_frame_count || state == CaptureState::Done
        };
    }

    backtrace::trace(|frame| {
        if is_done!() {
            return false;
        }

        backtrace::resolve_frame(frame, |symbol| {
            if is_done!() {
                return;
            }
            let Some(sym) = symbol.name() else {
                return;
            };
            let sym_demangled = format!("{sym:#}");

            match state {
                CaptureState::SkippingCaptureMachinery => {
                    if is_capture_machinery(&sym_demangled) {
                        return;
                    }
                    state = CaptureState::Capturing;
                }
                CaptureState::Capturing => {
                    if do_capture_filtering
                        && sym_demangled.contains("__rust_begin_short_backtrace")
                    {
                        state = CaptureState::Done;
                        return;
                    }
                }
                CaptureState::Done => return,
            }

            let frame_path = symbol.filename().map(|path| FramePath::new(cwd, path));
            frames.push(Frame {
                detected_as_std: frame_path.as_ref().is_some_and(|p| p.is_std)
                    || sym_demangled.starts_with("std::")
                    || sym_demangled.starts_with("core::")
                    || sym_demangled == "__rust_try"
                    || sym_demangled == "__GI___clone3"
                    || sym_demangled == "start_thread",
                sym_demangled,
                frame_path,
                lineno: symbol.lineno(),
            });
        });

        !(is_done!())
    });

    if do_capture_filtering {
        while let Some(last) = frames.last()
            && last.detected_as_std
        {
            frames.pop();
        }
    }
    frames
}

struct PathRegexes {
    rust_src: Regex,
    registry: Regex,
}

impl PathRegexes {
    fn get() -> Option<&'static Self> {
        static REGEXES: OnceLock<Option<PathRegexes>> = OnceLock::new();
        REGEXES
            .get_or_init(|| {
                Some(PathRegexes {
                    rust_src: Regex::new(
                        r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                    )
                    .ok()?,
                    registry: Regex::new(
                        r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^/]+-[0-9]+\.[^/]*/src/.*)$",
                    )
                    .ok()?,
                })
            })
            .as_ref()
    }
}

impl FramePath {
    fn new(cwd: Option<&Path>, path: &Path) -> Self {
        let raw_path = path.to_path_buf();
        let path_str = path.to_string_lossy();

        if let Some(regexes) = PathRegexes::get() {
            if let Some(crate_capture) = regexes
                .rust_src
                .captures(&path_str)
                .and_then(|captures| captures.get(1))
            {
                return Self {
                    short_path: Some(format!("[..]/{}", &path_str[crate_capture.start()..])),
                    raw_path,
                    is_std: true,
                };
            }
            if let Some(crate_capture) = regexes
                .registry
                .captures(&path_str)
                .and_then(|captures| captures.get(1))
            {
                return Self {
                    short_path: Some(format!("[..]/{}", crate_capture.as_str())),
                    raw_path,
                    is_std: false,
                };
            }
        }

        let short_path = cwd
            .and_then(|cwd| raw_path.strip_prefix(cwd).ok())
            .map(|stripped| stripped.to_string_lossy().into_owned());
        Self {
            short_path,
            raw_path,
            is_std: false,
        }
    }
}
