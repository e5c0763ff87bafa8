use std::fmt::Write as _;

use futures::future::{BoxFuture, FutureExt, Shared};

#[cfg(feature = "lumo-serde")]
use serde::{Deserialize, Serialize};

use super::{impl_resource, Resource, ResourceCore, ResourceKind};
use crate::error::{GpuError, Result};
use crate::gpu::{Device, WeakDevice};
use crate::native::{CompilerMessage, MessageKind, ObjectDescriptor};

/// When to print a shader's source listing next to its diagnostics.
pub use crate::gpu::DebugShaders as ShaderDebug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum ShaderStage {
    #[default]
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub enum ShaderLanguage {
    Glsl,
    Wgsl,
}

/// GLSL sources carry a `#version` directive; anything else is taken as WGSL.
pub fn detect_language(source: &str) -> ShaderLanguage {
    if source
        .lines()
        .any(|line| line.trim_start().starts_with("#version"))
    {
        ShaderLanguage::Glsl
    } else {
        ShaderLanguage::Wgsl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationOutcome {
    pub status: CompilationStatus,
    pub messages: Vec<CompilerMessage>,
}

impl CompilationOutcome {
    fn from_messages(messages: Vec<CompilerMessage>) -> Self {
        let failed = messages.iter().any(|m| m.kind == MessageKind::Error);
        Self {
            status: if failed {
                CompilationStatus::Error
            } else {
                CompilationStatus::Success
            },
            messages,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.status == CompilationStatus::Error
    }
}

pub(crate) type CompilationFuture = Shared<BoxFuture<'static, CompilationOutcome>>;

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Error => "ERROR",
        MessageKind::Warning => "WARNING",
        MessageKind::Info => "INFO",
    }
}

/// Formats compiler messages, optionally interleaved with a numbered
/// listing of `source`.
pub fn format_compiler_log(messages: &[CompilerMessage], source: Option<&str>) -> String {
    let mut out = String::new();
    let Some(source) = source else {
        for message in messages {
            let _ = writeln!(
                out,
                "{} {}:{}: {}",
                kind_label(message.kind),
                message.line,
                message.column,
                message.message
            );
        }
        return out;
    };

    let mut line_count = 0;
    for (index, line) in source.lines().enumerate() {
        let number = index as u32 + 1;
        line_count = number;
        let _ = writeln!(out, "{number:4}: {line}");
        for message in messages.iter().filter(|m| m.line == number) {
            let _ = writeln!(
                out,
                "{:>width$}^^^ {}: {}",
                "",
                kind_label(message.kind),
                message.message,
                width = 6 + message.column.saturating_sub(1) as usize
            );
        }
    }
    for message in messages
        .iter()
        .filter(|m| m.line == 0 || m.line > line_count)
    {
        let _ = writeln!(out, "{}: {}", kind_label(message.kind), message.message);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "lumo-serde", derive(Serialize, Deserialize))]
pub struct ShaderProps {
    pub label: Option<String>,
    pub stage: ShaderStage,
    /// Fully resolved source text.
    pub source: String,
    /// Inferred from `source` when `None`.
    pub language: Option<ShaderLanguage>,
    /// Defaults to `main`.
    pub entry_point: Option<String>,
    /// Overrides the device's `debug_shaders` setting.
    pub debug: Option<ShaderDebug>,
}

/// A compiled shader module. Compilation finishes asynchronously; see
/// [`Shader::compilation_status`].
pub struct Shader {
    core: ResourceCore,
    stage: ShaderStage,
    language: ShaderLanguage,
    source: String,
    entry_point: String,
    compilation: CompilationFuture,
}

impl_resource!(Shader);

impl Shader {
    pub(crate) fn new(device: &Device, props: &ShaderProps) -> Result<Self> {
        if props.source.trim().is_empty() {
            return Err(GpuError::invalid("shader source is empty"));
        }
        let language = props
            .language
            .unwrap_or_else(|| detect_language(&props.source));
        let entry_point = props.entry_point.clone().unwrap_or_else(|| "main".to_string());

        let (handle, messages) = device.with_backend(|backend| {
            if !backend.accepts_language(language) {
                return Err(GpuError::invalid(format!(
                    "the {} backend does not accept {language:?} shaders",
                    backend.kind()
                )));
            }
            let handle = backend.create_object(&ObjectDescriptor::Shader {
                stage: props.stage,
                source: &props.source,
                entry_point: &entry_point,
            })?;
            Ok((handle, backend.compilation_messages(handle)))
        })?;

        let core = ResourceCore::new(device, ResourceKind::Shader, props.label.as_deref(), handle);
        let compilation = compile_watch(
            device.downgrade(),
            core.label().to_string(),
            props.source.clone(),
            props.debug.unwrap_or_else(|| device.debug_shaders()),
            messages,
        );
        // Synchronous compilers resolve here and report right away.
        if compilation.clone().now_or_never().is_none() {
            device.track_compilation(compilation.clone());
        }

        Ok(Self {
            core,
            stage: props.stage,
            language,
            source: props.source.clone(),
            entry_point,
            compilation,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn language(&self) -> ShaderLanguage {
        self.language
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Resolves once compilation has finished. Every clone sees the same
    /// outcome, and failures reach the device reporter once.
    pub fn compilation_status(&self) -> Shared<BoxFuture<'static, CompilationOutcome>> {
        self.compilation.clone()
    }

    /// Current status without waiting or driving compilation.
    pub fn status(&self) -> CompilationStatus {
        match self.compilation.peek() {
            Some(outcome) => outcome.status,
            None => CompilationStatus::Pending,
        }
    }

    pub fn compilation_info(&self) -> BoxFuture<'static, Vec<CompilerMessage>> {
        self.compilation
            .clone()
            .map(|outcome| outcome.messages)
            .boxed()
    }

    /// The failure, if compilation has already finished with errors.
    pub(crate) fn known_failure(&self) -> Option<GpuError> {
        let outcome = self.compilation.peek()?;
        outcome.has_errors().then(|| GpuError::Compilation {
            label: self.label().to_string(),
            log: format_compiler_log(&outcome.messages, None),
        })
    }
}

fn compile_watch(
    device: WeakDevice,
    label: String,
    source: String,
    debug: ShaderDebug,
    messages: BoxFuture<'static, Vec<CompilerMessage>>,
) -> CompilationFuture {
    messages
        .map(move |messages| {
            let outcome = CompilationOutcome::from_messages(messages);
            if let Some(device) = device.upgrade() {
                report_outcome(&device, &label, &source, debug, &outcome);
            }
            outcome
        })
        .boxed()
        .shared()
}

fn report_outcome(
    device: &Device,
    label: &str,
    source: &str,
    debug: ShaderDebug,
    outcome: &CompilationOutcome,
) {
    let errors = outcome.has_errors();
    let warnings = outcome
        .messages
        .iter()
        .any(|m| m.kind == MessageKind::Warning);
    let listing = match debug {
        ShaderDebug::Never => false,
        ShaderDebug::Errors => errors,
        ShaderDebug::Warnings => errors || warnings,
        ShaderDebug::Always => true,
    } || (errors && device.is_debug());
    if listing {
        log::error!(
            "{}: shader \"{label}\" compilation log\n{}",
            device.id(),
            format_compiler_log(&outcome.messages, Some(source))
        );
    }
    if errors {
        device.report_error(&GpuError::Compilation {
            label: label.to_string(),
            log: format_compiler_log(&outcome.messages, None),
        });
        device.debug();
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // Last chance to surface a failure nobody awaited.
        let _ = self.compilation.clone().now_or_never();
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("core", &self.core)
            .field("stage", &self.stage)
            .field("language", &self.language)
            .field("status", &self.status())
            .finish()
    }
}
