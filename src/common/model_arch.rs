use std::path::{Path, PathBuf};

/// Which network layout is evaluated.
///
/// Architecture names are only descriptive here: the graph itself comes from
/// the exported checkpoint. They are compared against the `arch` metadata
/// entry of the ONNX file when one is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelArch {
    EncoderDecoder { encoder: String, decoder: String },
    Unet { arch: String },
}

/// Lower-case and trim an architecture selector.
pub fn normalize_arch(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ModelArch {
    pub fn encoder_decoder(encoder: &str, decoder: &str) -> Self {
        ModelArch::EncoderDecoder {
            encoder: normalize_arch(encoder),
            decoder: normalize_arch(decoder),
        }
    }

    pub fn unet(arch: &str) -> Self {
        ModelArch::Unet {
            arch: normalize_arch(arch),
        }
    }

    pub fn is_unet(&self) -> bool {
        matches!(self, ModelArch::Unet { .. })
    }

    pub fn name(&self) -> String {
        match self {
            ModelArch::EncoderDecoder { encoder, decoder } => format!("{encoder}+{decoder}"),
            ModelArch::Unet { arch } => format!("unet/{arch}"),
        }
    }

    /// Component names used to build checkpoint file names, in load order.
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            ModelArch::EncoderDecoder { .. } => &["encoder", "decoder"],
            ModelArch::Unet { .. } => &["unet"],
        }
    }

    /// `<ckpt>/<id>/<component><suffix>` for every component.
    pub fn checkpoint_paths(&self, ckpt: &Path, id: &str, suffix: &str) -> Vec<PathBuf> {
        self.components()
            .iter()
            .map(|component| ckpt.join(id).join(format!("{component}{suffix}")))
            .collect()
    }
}
