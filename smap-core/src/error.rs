use thiserror::Error;

/// Result alias used by record and option validation.
pub type Result<T> = std::result::Result<T, SmapError>;

/// Why a map container was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerProblem {
    /// No container element was supplied or found.
    NotFound,
    /// The container exists but carries no `id` attribute.
    MissingId,
}

impl std::fmt::Display for ContainerProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerProblem::NotFound => f.write_str("map container not found"),
            ContainerProblem::MissingId => f.write_str("map container must have an \"id\" attribute"),
        }
    }
}

/// Failures detected while preparing a [`crate::MapManager`].
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ConfigError {
    #[error("map engine is not available")]
    MissingEngine,

    #[error("{0}")]
    InvalidContainer(ContainerProblem),

    #[error("missing required center parameter as [lat, lng]")]
    MissingCenter,

    #[error("clustering is enabled but the marker cluster library is missing")]
    MissingClusterLibrary,
}

/// Failures detected while preparing an overlay or an option patch.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum SmapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("missing required dependency: {library}")]
    MissingDependency { library: &'static str },

    #[error("missing or invalid position: {0}")]
    InvalidPosition(String),

    #[error("missing or invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("{option} must be {expected}")]
    InvalidOptionType {
        option: &'static str,
        expected: &'static str,
    },
}

impl SmapError {
    #[inline]
    pub fn missing_dependency(library: &'static str) -> Self {
        Self::MissingDependency { library }
    }

    #[inline]
    pub fn invalid_position(message: impl Into<String>) -> Self {
        Self::InvalidPosition(message.into())
    }

    #[inline]
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    #[inline]
    pub fn invalid_option_type(option: &'static str, expected: &'static str) -> Self {
        Self::InvalidOptionType { option, expected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_problems_render_their_reason() {
        let err = ConfigError::InvalidContainer(ContainerProblem::MissingId);
        assert!(err.to_string().contains("\"id\" attribute"));

        let err = ConfigError::InvalidContainer(ContainerProblem::NotFound);
        assert_eq!(err.to_string(), "map container not found");
    }

    #[test]
    fn config_errors_are_transparent_inside_smap_error() {
        let err: SmapError = ConfigError::MissingCenter.into();
        assert_eq!(err.to_string(), ConfigError::MissingCenter.to_string());
        assert!(matches!(err, SmapError::Config(ConfigError::MissingCenter)));
    }

    #[test]
    fn option_type_error_names_option_and_shape() {
        let err = SmapError::invalid_option_type("center", "an indexed array [lat, lng]");
        let msg = err.to_string();
        assert!(msg.starts_with("center"));
        assert!(msg.contains("[lat, lng]"));
    }
}
