//! Bridge configuration: eye target formats, sampling, clear color, logging.

/// Color format of explicit-backend eye targets. The render-manager presents 8-bit RGBA
/// unsigned-normalized buffers in direct mode, so that is the only format offered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorFormat {
    #[default]
    Rgba8Unorm,
}

/// Min/mag filter of immediate-backend eye textures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// S/T wrap mode of immediate-backend eye textures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureWrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// Bridge configuration shared by both backends and the plugin state.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Explicit backend eye target format.
    pub color_format: ColorFormat,
    /// Immediate backend eye texture filtering.
    pub texture_filter: TextureFilter,
    /// Immediate backend eye texture wrap.
    pub texture_wrap: TextureWrap,
    /// Immediate backend clear color, applied before the host texture is blitted.
    pub clear_color: [f32; 4],
    /// Flip Y when presenting explicit-backend buffers (host textures are upside-down on D3D11).
    pub flip_y_explicit: bool,
    /// Max level forwarded to the host console.
    pub log_level: log::LevelFilter,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            color_format: ColorFormat::default(),
            texture_filter: TextureFilter::default(),
            texture_wrap: TextureWrap::default(),
            clear_color: [1.0, 0.0, 0.0, 1.0],
            flip_y_explicit: true,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl BridgeConfig {
    /// Default config with overrides from `OSVR_UNITY_LOG` (log level) and `OSVR_UNITY_FLIP_Y` (0/1).
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = var("OSVR_UNITY_LOG").and_then(|v| v.parse().ok()) {
            config.log_level = level;
        }
        if let Some(flip) = var("OSVR_UNITY_FLIP_Y") {
            config.flip_y_explicit = !matches!(flip.trim(), "0" | "false" | "off");
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_apply() {
        let config = BridgeConfig::from_vars(|key| match key {
            "OSVR_UNITY_LOG" => Some("debug".to_string()),
            "OSVR_UNITY_FLIP_Y" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert!(!config.flip_y_explicit);
    }

    #[test]
    fn unparsable_level_keeps_default() {
        let config = BridgeConfig::from_vars(|key| (key == "OSVR_UNITY_LOG").then(|| "loud".to_string()));
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert!(config.flip_y_explicit);
    }
}
