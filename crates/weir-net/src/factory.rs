#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::{
    error::{LoaderError, LoaderResult},
    options::{LoaderOptions, SeekType},
    ranged::RangedLoader,
    seek::{ParamSeekHandler, RangeSeekHandler, SeekHandler},
    stream::StreamLoader,
    traits::Loader,
    types::DataSource,
    websocket::WebSocketLoader,
};

/// Pick the seek handler a session will shape its requests with.
pub fn select_seek_handler(options: &LoaderOptions) -> LoaderResult<Arc<dyn SeekHandler>> {
    match options.seek_type {
        SeekType::Range => Ok(Arc::new(RangeSeekHandler::new(
            options.range_load_zero_start,
        ))),
        SeekType::Param => Ok(Arc::new(ParamSeekHandler::new(
            options.seek_param_start.clone(),
            options.seek_param_end.clone(),
        ))),
        SeekType::Custom => options.custom_seek_handler.clone().ok_or_else(|| {
            LoaderError::InvalidArgument(
                "seek_type is custom but no custom seek handler was configured".into(),
            )
        }),
    }
}

/// Pick the transport for `source`, first match wins: configured custom
/// factory, WebSocket for `ws`/`wss` URLs, streaming HTTP, ranged HTTP.
pub fn select_loader(
    source: &DataSource,
    seek_handler: Arc<dyn SeekHandler>,
    options: &LoaderOptions,
) -> LoaderResult<Box<dyn Loader>> {
    if let Some(factory) = &options.custom_loader {
        return Ok(factory.create(seek_handler, options));
    }
    if matches!(source.url().scheme(), "ws" | "wss") {
        return Ok(Box::new(WebSocketLoader::new(options.clone())));
    }
    if StreamLoader::is_supported() {
        return Ok(Box::new(StreamLoader::new(seek_handler, options.clone())));
    }
    if RangedLoader::is_supported() {
        return Ok(Box::new(RangedLoader::new(seek_handler, options.clone())));
    }
    Err(LoaderError::Runtime(
        "no byte-stream transport available in this environment".into(),
    ))
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::{
        traits::{LoaderFactory, MockLoader},
        types::{LoaderKind, LoaderStatus},
    };

    fn source(raw: &str) -> DataSource {
        DataSource::new(Url::parse(raw).expect("valid test URL"))
    }

    #[test]
    fn custom_seek_type_without_handler_is_rejected() {
        let options = LoaderOptions::default().with_seek_type(SeekType::Custom);
        assert!(matches!(
            select_seek_handler(&options),
            Err(LoaderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn websocket_urls_pick_the_websocket_loader() {
        let options = LoaderOptions::default();
        let handler = select_seek_handler(&options).unwrap();
        let loader = select_loader(&source("wss://live.example/stream"), handler, &options).unwrap();
        assert_eq!(loader.kind(), LoaderKind::WebSocket);
        assert!(loader.needs_stash_buffer());
    }

    #[test]
    fn http_urls_pick_the_streaming_loader() {
        let options = LoaderOptions::default();
        let handler = select_seek_handler(&options).unwrap();
        let loader = select_loader(&source("https://cdn.example/v.flv"), handler, &options).unwrap();
        assert_eq!(loader.kind(), LoaderKind::Stream);
        assert!(loader.needs_stash_buffer());
        assert_eq!(loader.status(), LoaderStatus::Idle);
    }

    #[test]
    fn custom_factory_overrides_auto_selection() {
        struct FixedFactory;

        impl LoaderFactory for FixedFactory {
            fn create(
                &self,
                _seek_handler: Arc<dyn SeekHandler>,
                _options: &LoaderOptions,
            ) -> Box<dyn Loader> {
                let mut mock = MockLoader::new();
                mock.expect_kind()
                    .return_const(LoaderKind::Custom("fixed"));
                mock.expect_needs_stash_buffer().return_const(true);
                Box::new(mock)
            }
        }

        let options = LoaderOptions::default().with_custom_loader(Arc::new(FixedFactory));
        let handler = select_seek_handler(&options).unwrap();
        let loader = select_loader(&source("https://cdn.example/v.flv"), handler, &options).unwrap();
        assert_eq!(loader.kind(), LoaderKind::Custom("fixed"));
    }
}
