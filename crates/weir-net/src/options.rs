#![forbid(unsafe_code)]

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use crate::{
    error::LoaderError,
    seek::SeekHandler,
    traits::LoaderFactory,
    types::Headers,
};

/// Which [`SeekHandler`] a session uses to express byte ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeekType {
    /// HTTP `Range` header.
    #[default]
    Range,
    /// Query parameters (`bstart`/`bend` by default).
    Param,
    /// Caller-supplied handler from [`LoaderOptions::custom_seek_handler`].
    Custom,
}

impl FromStr for SeekType {
    type Err = LoaderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "range" => Ok(Self::Range),
            "param" => Ok(Self::Param),
            "custom" => Ok(Self::Custom),
            other => Err(LoaderError::InvalidArgument(format!(
                "unknown seek type: {other:?}"
            ))),
        }
    }
}

/// Transport configuration shared by every loader instance of a session.
#[derive(Clone)]
pub struct LoaderOptions {
    pub seek_type: SeekType,
    /// Range handler sends `Range: bytes=0-` even for whole-resource
    /// requests.
    pub range_load_zero_start: bool,
    /// Query parameter naming for [`SeekType::Param`].
    pub seek_param_start: String,
    pub seek_param_end: String,
    /// Used iff `seek_type == SeekType::Custom`.
    pub custom_seek_handler: Option<Arc<dyn SeekHandler>>,
    /// Overrides loader auto-selection entirely when set.
    pub custom_loader: Option<Arc<dyn LoaderFactory>>,
    /// Re-request against a previously resolved redirect target instead of
    /// the origin URL.
    pub reuse_redirected_url: bool,
    /// Additional request headers applied to every transport request.
    pub headers: Headers,
    /// Forwarded to HTTP transports as a request header when set.
    pub referrer_policy: Option<String>,
    /// Budget for the connection phase only; streaming bodies are
    /// long-lived and carry no overall deadline.
    pub connect_timeout: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            seek_type: SeekType::Range,
            range_load_zero_start: false,
            seek_param_start: crate::seek::ParamSeekHandler::DEFAULT_START.to_string(),
            seek_param_end: crate::seek::ParamSeekHandler::DEFAULT_END.to_string(),
            custom_seek_handler: None,
            custom_loader: None,
            reuse_redirected_url: false,
            headers: Headers::new(),
            referrer_policy: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("seek_type", &self.seek_type)
            .field("range_load_zero_start", &self.range_load_zero_start)
            .field("seek_param_start", &self.seek_param_start)
            .field("seek_param_end", &self.seek_param_end)
            .field("custom_seek_handler", &self.custom_seek_handler.is_some())
            .field("custom_loader", &self.custom_loader.is_some())
            .field("reuse_redirected_url", &self.reuse_redirected_url)
            .field("referrer_policy", &self.referrer_policy)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl LoaderOptions {
    pub fn with_seek_type(mut self, seek_type: SeekType) -> Self {
        self.seek_type = seek_type;
        self
    }

    pub fn with_seek_params(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.seek_param_start = start.into();
        self.seek_param_end = end.into();
        self
    }

    pub fn with_custom_seek_handler(mut self, handler: Arc<dyn SeekHandler>) -> Self {
        self.custom_seek_handler = Some(handler);
        self.seek_type = SeekType::Custom;
        self
    }

    pub fn with_custom_loader(mut self, factory: Arc<dyn LoaderFactory>) -> Self {
        self.custom_loader = Some(factory);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_type_parses_known_names() {
        assert_eq!("range".parse::<SeekType>().unwrap(), SeekType::Range);
        assert_eq!("param".parse::<SeekType>().unwrap(), SeekType::Param);
        assert_eq!("custom".parse::<SeekType>().unwrap(), SeekType::Custom);
        assert!(matches!(
            "bogus".parse::<SeekType>(),
            Err(LoaderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = LoaderOptions::default();
        assert_eq!(options.seek_type, SeekType::Range);
        assert_eq!(options.seek_param_start, "bstart");
        assert_eq!(options.seek_param_end, "bend");
        assert!(!options.reuse_redirected_url);
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
    }
}
