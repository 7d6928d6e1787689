//! Operation registry: what each operation needs, where it runs and which
//! byte stream feeds it.
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

use crate::{MetadataField, OriginalFile};

/// Scale factor used when the caller does not pick one.
pub const DEFAULT_SCALE_FACTOR: u32 = 4;
pub const MAX_UPSCALE_FACTOR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Generate,
    EditAi,
    RemoveBg,
    Upscale,
    Scale,
    ColorChange,
    Invert,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Generate,
        OperationKind::EditAi,
        OperationKind::RemoveBg,
        OperationKind::Upscale,
        OperationKind::Scale,
        OperationKind::ColorChange,
        OperationKind::Invert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Generate => "generate",
            OperationKind::EditAi => "edit-ai",
            OperationKind::RemoveBg => "remove-bg",
            OperationKind::Upscale => "upscale",
            OperationKind::Scale => "scale",
            OperationKind::ColorChange => "color-change",
            OperationKind::Invert => "invert",
        }
    }

    pub fn spec(self) -> OperationSpec {
        match self {
            OperationKind::Generate => OperationSpec {
                endpoint: "api/generate",
                encoding: RequestEncoding::InlineJson,
                response: ResponseKind::GeneratedMetadata,
                // Listing copy describes the product as photographed.
                source_policy: SourcePolicy::ForceOriginal,
                interaction: Interaction::None,
                action: None,
            },
            OperationKind::EditAi => OperationSpec {
                endpoint: "api/edit-ai",
                encoding: RequestEncoding::InlineJson,
                response: ResponseKind::GeneratedImage,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::Instruction,
                action: None,
            },
            OperationKind::RemoveBg => OperationSpec {
                endpoint: "process",
                encoding: RequestEncoding::Multipart,
                response: ResponseKind::ImageBytes,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::None,
                action: Some("remove_bg"),
            },
            OperationKind::Upscale => OperationSpec {
                endpoint: "process",
                encoding: RequestEncoding::Multipart,
                response: ResponseKind::ImageBytes,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::None,
                action: Some("upscale"),
            },
            OperationKind::Scale => OperationSpec {
                endpoint: "api/scale",
                encoding: RequestEncoding::Multipart,
                response: ResponseKind::ImageBytes,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::None,
                action: None,
            },
            OperationKind::ColorChange => OperationSpec {
                endpoint: "api/color-change",
                encoding: RequestEncoding::Multipart,
                response: ResponseKind::ImageBytes,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::ColorSelection,
                action: None,
            },
            OperationKind::Invert => OperationSpec {
                endpoint: "api/invert",
                encoding: RequestEncoding::Multipart,
                response: ResponseKind::ImageBytes,
                source_policy: SourcePolicy::PreferProcessed,
                interaction: Interaction::None,
                action: None,
            },
        }
    }

    pub fn is_interactive(self) -> bool {
        self.spec().interaction != Interaction::None
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation `{0}`")]
pub struct UnknownOperation(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownOperation(wanted.to_string()))
    }
}

/// Registry entry for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    /// Path relative to the service base URL.
    pub endpoint: &'static str,
    pub encoding: RequestEncoding,
    pub response: ResponseKind,
    pub source_policy: SourcePolicy,
    pub interaction: Interaction,
    /// `action` form value expected by the shared processing endpoint.
    pub action: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEncoding {
    /// Source bytes as a multipart file part.
    Multipart,
    /// Source bytes base64-encoded inside a JSON body.
    InlineJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    ImageBytes,
    GeneratedMetadata,
    GeneratedImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Latest processed output, else the original.
    PreferProcessed,
    ForceOriginal,
    /// Caller supplies the bytes; without them behaves as `PreferProcessed`.
    Explicit,
}

/// Input that must be collected from the user before the operation can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    None,
    Instruction,
    ColorSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Colour replacement request, optionally restricted to polygon masks given
/// in normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSelection {
    pub target: Rgb,
    pub replacement: Rgb,
    pub tolerance: u8,
    pub polygons: Vec<Vec<(f32, f32)>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationParams {
    pub provider: Option<String>,
    pub scale_factor: Option<u32>,
    pub instruction: Option<String>,
    pub color: Option<ColorSelection>,
    /// Restrict generation to a single metadata field.
    pub field: Option<MetadataField>,
}

impl OperationParams {
    pub fn with_instruction(instruction: impl Into<String>) -> Self {
        Self {
            instruction: Some(instruction.into()),
            ..Self::default()
        }
    }

    pub fn with_color(color: ColorSelection) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn effective_scale(&self) -> u32 {
        self.scale_factor.unwrap_or(DEFAULT_SCALE_FACTOR)
    }

    /// Check that the parameters carry everything `kind` needs.
    pub fn validate(&self, kind: OperationKind) -> Result<(), ParamsError> {
        match kind.spec().interaction {
            Interaction::Instruction => {
                let has_text = self
                    .instruction
                    .as_deref()
                    .is_some_and(|text| !text.trim().is_empty());
                if !has_text {
                    return Err(ParamsError::MissingInstruction(kind));
                }
            }
            Interaction::ColorSelection => {
                let Some(color) = &self.color else {
                    return Err(ParamsError::MissingColor(kind));
                };
                let finite = color
                    .polygons
                    .iter()
                    .flatten()
                    .all(|(x, y)| x.is_finite() && y.is_finite());
                if !finite {
                    return Err(ParamsError::InvalidPolygon);
                }
                if color.polygons.iter().any(|polygon| polygon.len() < 3) {
                    return Err(ParamsError::InvalidPolygon);
                }
            }
            Interaction::None => {}
        }
        if let Some(factor) = self.scale_factor {
            let max = match kind {
                OperationKind::Upscale => MAX_UPSCALE_FACTOR,
                _ => u32::MAX,
            };
            if factor == 0 || factor > max {
                return Err(ParamsError::ScaleOutOfRange { kind, factor });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("{0} needs a non-empty instruction")]
    MissingInstruction(OperationKind),
    #[error("{0} needs a colour selection")]
    MissingColor(OperationKind),
    #[error("selection polygons need at least three finite points")]
    InvalidPolygon,
    #[error("scale factor {factor} is out of range for {kind}")]
    ScaleOutOfRange { kind: OperationKind, factor: u32 },
}

/// Source requested by a plan step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceChoice {
    /// Apply the operation's registered policy.
    #[default]
    Default,
    Original,
    /// Raw output of the previous step of the same plan.
    PreviousOutput,
    Explicit { name: String, bytes: Bytes },
}

/// The byte stream an operation will consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Original(OriginalFile),
    Processed(String),
    Bytes { name: String, bytes: Bytes },
}

/// Pick the source for one step.
///
/// Caller-supplied bytes (an explicit source, or the previous step's output)
/// win over the registered policy. `Explicit` policy without supplied bytes
/// and `PreviousOutput` on a first step fall back to preferring the
/// processed output.
pub fn resolve_source(
    kind: OperationKind,
    choice: &SourceChoice,
    original: &OriginalFile,
    processed_url: Option<&str>,
    previous_output: Option<(&str, &Bytes)>,
) -> ResolvedSource {
    match choice {
        SourceChoice::Explicit { name, bytes } => {
            return ResolvedSource::Bytes {
                name: name.clone(),
                bytes: bytes.clone(),
            };
        }
        SourceChoice::PreviousOutput => {
            if let Some((name, bytes)) = previous_output {
                return ResolvedSource::Bytes {
                    name: name.to_string(),
                    bytes: bytes.clone(),
                };
            }
        }
        SourceChoice::Original => return ResolvedSource::Original(original.clone()),
        SourceChoice::Default => {}
    }

    apply_policy(kind.spec().source_policy, original, processed_url)
}

fn apply_policy(
    policy: SourcePolicy,
    original: &OriginalFile,
    processed_url: Option<&str>,
) -> ResolvedSource {
    match policy {
        SourcePolicy::ForceOriginal => ResolvedSource::Original(original.clone()),
        SourcePolicy::PreferProcessed | SourcePolicy::Explicit => match processed_url {
            Some(url) => ResolvedSource::Processed(url.to_string()),
            None => ResolvedSource::Original(original.clone()),
        },
    }
}
