//! LrcCX API client
//!
//! ## API Endpoints
//!
//! - **Lyrics**: `GET {base}/lyrics?title=..&artist=..[&album=..]` answers LRC
//!   text with status 200.
//! - **Cover**: `GET {base}/cover?title=..&artist=..[&album=..]` answers image
//!   bytes with an `image/*` content type.
//!
//! `album` is only sent when the track has a real album name. Tracks without
//! a known artist or with an empty title are never looked up.
//!
//! ## Rate Limiting
//!
//! Requests are spaced by `rate_limit_delay_ms` (1 second by default), shared
//! across lyrics and cover calls.

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use core_library::TrackDescriptor;
use core_runtime::config::RemoteApiConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::RateLimiter;
use crate::error::{MetadataError, Result};
use crate::models::{
    CoverImage, EnrichmentField, FieldOutcome, FieldSet, MissReason, RemoteFetchResult,
};
use crate::remote::RemoteEnricher;

/// [`RemoteEnricher`] backed by the LrcCX lyrics and cover API.
pub struct LrcCxEnricher {
    http_client: Arc<dyn HttpClient>,
    config: RemoteApiConfig,
    rate_limiter: RateLimiter,
}

impl LrcCxEnricher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: RemoteApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_delay_ms, clock);
        Self {
            http_client,
            config,
            rate_limiter,
        }
    }

    fn endpoint(&self, field: EnrichmentField) -> String {
        let path = match field {
            EnrichmentField::Lyrics => "lyrics",
            EnrichmentField::Cover => "cover",
        };
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn build_request(&self, descriptor: &TrackDescriptor, field: EnrichmentField) -> HttpRequest {
        let mut request = HttpRequest::get(self.endpoint(field))
            .query("title", descriptor.title.as_str())
            .query("artist", descriptor.artist.as_str())
            .timeout(self.config.request_timeout);

        if let Some(album) = descriptor.known_album() {
            request = request.query("album", album);
        }
        if let Some(user_agent) = &self.config.user_agent {
            request = request.header("User-Agent", user_agent.as_str());
        }
        request
    }

    /// One rate-limited request bounded by the configured timeout.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.rate_limiter.wait_if_needed().await;

        let timeout = self.config.request_timeout;
        debug!(url = %request.url, "Requesting LrcCX");
        match tokio::time::timeout(timeout, self.http_client.execute(request)).await {
            Err(_) => Err(MetadataError::RemoteTimeout(timeout)),
            Ok(Err(BridgeError::Timeout(after))) => Err(MetadataError::RemoteTimeout(after)),
            Ok(Err(e)) => Err(MetadataError::RemoteUnavailable(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }

    async fn fetch_lyrics(&self, descriptor: &TrackDescriptor) -> Result<Option<String>> {
        let response = self
            .send(self.build_request(descriptor, EnrichmentField::Lyrics))
            .await?;

        if response.status == 404 {
            return Ok(None);
        }
        if response.status != 200 {
            return Err(MetadataError::RemoteUnavailable(format!(
                "lyrics endpoint returned HTTP {}",
                response.status
            )));
        }

        let text = String::from_utf8_lossy(&response.body).into_owned();
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }

    async fn fetch_cover(&self, descriptor: &TrackDescriptor) -> Result<Option<CoverImage>> {
        let response = self
            .send(self.build_request(descriptor, EnrichmentField::Cover))
            .await?;

        if response.status == 404 {
            return Ok(None);
        }
        if response.status != 200 {
            return Err(MetadataError::RemoteUnavailable(format!(
                "cover endpoint returned HTTP {}",
                response.status
            )));
        }

        let is_image = response
            .content_type()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false);
        if !is_image || response.body.is_empty() {
            debug!(
                content_type = ?response.content_type(),
                "Cover endpoint answered without an image"
            );
            return Ok(None);
        }

        Ok(CoverImage::sniff(response.body))
    }
}

fn into_outcome<T>(field: EnrichmentField, result: Result<Option<T>>) -> FieldOutcome<T> {
    match result {
        Ok(Some(value)) => FieldOutcome::Found(value),
        Ok(None) => FieldOutcome::Unavailable(MissReason::NotFound),
        Err(MetadataError::RemoteTimeout(after)) => {
            warn!(field = %field, "LrcCX request timed out after {:?}", after);
            FieldOutcome::Unavailable(MissReason::Timeout)
        }
        Err(e) => {
            warn!(field = %field, error = %e, "LrcCX request failed");
            FieldOutcome::Unavailable(MissReason::Error(e.to_string()))
        }
    }
}

#[async_trait]
impl RemoteEnricher for LrcCxEnricher {
    #[instrument(
        skip(self, descriptor, needed),
        fields(key = %descriptor.identity, fields = ?needed.names())
    )]
    async fn fetch_remote(
        &self,
        descriptor: &TrackDescriptor,
        needed: FieldSet,
    ) -> RemoteFetchResult {
        if !descriptor.is_searchable() {
            debug!(
                key = %descriptor.identity,
                "Track has no artist or title, skipping remote lookup"
            );
            return RemoteFetchResult::unavailable(needed, MissReason::NotSearchable);
        }

        let mut result = RemoteFetchResult::not_requested();

        if needed.contains(EnrichmentField::Lyrics) {
            let lyrics = self.fetch_lyrics(descriptor).await;
            result.lyrics = into_outcome(EnrichmentField::Lyrics, lyrics);
        }
        if needed.contains(EnrichmentField::Cover) {
            result.cover = into_outcome(EnrichmentField::Cover, self.fetch_cover(descriptor).await);
        }

        info!(
            artist = %descriptor.artist,
            title = %descriptor.title,
            lyrics = result.lyrics.is_found(),
            cover = result.cover.is_found(),
            "LrcCX lookup finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use core_library::{FileStamp, ScannedFile, TrackTags};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const PNG: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    /// Answers by endpoint and records every request.
    #[derive(Default)]
    struct ScriptedHttp {
        lyrics: Option<HttpResponse>,
        cover: Option<HttpResponse>,
        hang: bool,
        requests: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(
            &self,
            request: HttpRequest,
        ) -> bridge_traits::error::Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            let scripted = if request.url.ends_with("/lyrics") {
                self.lyrics.clone()
            } else {
                self.cover.clone()
            };
            Ok(scripted.unwrap_or_else(|| HttpResponse::new(404, Vec::new())))
        }
    }

    fn descriptor(artist: Option<&str>, album: Option<&str>) -> TrackDescriptor {
        let scanned = ScannedFile::new(
            Path::new("/music"),
            PathBuf::from("/music/song.mp3"),
            FileStamp {
                size: 10,
                modified_at: Some(1),
            },
        );
        TrackDescriptor::new(
            scanned,
            TrackTags {
                title: Some("Song".to_string()),
                artist: artist.map(str::to_string),
                album: album.map(str::to_string),
            },
            false,
        )
    }

    fn enricher(http: Arc<ScriptedHttp>) -> LrcCxEnricher {
        let config = RemoteApiConfig::new()
            .with_base_url("https://lrc.test/")
            .with_request_timeout(Duration::from_secs(10))
            .with_rate_limit_delay_ms(0);
        LrcCxEnricher::new(http, config, Arc::new(ManualClock::starting_now()))
    }

    #[tokio::test]
    async fn test_unsearchable_track_makes_no_request() {
        let http = Arc::new(ScriptedHttp::default());
        let result = enricher(http.clone())
            .fetch_remote(&descriptor(None, None), FieldSet::all())
            .await;

        assert_eq!(result.lyrics, FieldOutcome::Unavailable(MissReason::NotSearchable));
        assert_eq!(result.cover, FieldOutcome::Unavailable(MissReason::NotSearchable));
        assert!(http.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_album_sent_only_when_known() {
        let http = Arc::new(ScriptedHttp::default());
        let enricher = enricher(http.clone());

        enricher
            .fetch_remote(
                &descriptor(Some("Artist"), None),
                FieldSet::only(EnrichmentField::Lyrics),
            )
            .await;
        enricher
            .fetch_remote(
                &descriptor(Some("Artist"), Some("Album")),
                FieldSet::only(EnrichmentField::Lyrics),
            )
            .await;

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "https://lrc.test/lyrics");
        assert_eq!(requests[0].query_param("title"), Some("Song"));
        assert_eq!(requests[0].query_param("artist"), Some("Artist"));
        assert_eq!(requests[0].query_param("album"), None);
        assert_eq!(requests[1].query_param("album"), Some("Album"));
    }

    #[tokio::test]
    async fn test_found_lyrics_and_cover() {
        let http = Arc::new(ScriptedHttp {
            lyrics: Some(HttpResponse::new(200, "[00:01.00]hello")),
            cover: Some(
                HttpResponse::new(200, PNG.to_vec()).with_header("Content-Type", "image/png"),
            ),
            ..Default::default()
        });

        let result = enricher(http)
            .fetch_remote(&descriptor(Some("Artist"), None), FieldSet::all())
            .await;

        assert_eq!(result.lyrics, FieldOutcome::Found("[00:01.00]hello".to_string()));
        let cover = result.cover.found().unwrap();
        assert_eq!(cover.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_non_image_cover_and_empty_lyrics_are_not_found() {
        let http = Arc::new(ScriptedHttp {
            lyrics: Some(HttpResponse::new(200, "   ")),
            cover: Some(
                HttpResponse::new(200, "<html>nope</html>")
                    .with_header("content-type", "text/html"),
            ),
            ..Default::default()
        });

        let result = enricher(http)
            .fetch_remote(&descriptor(Some("Artist"), None), FieldSet::all())
            .await;

        assert_eq!(result.lyrics, FieldOutcome::Unavailable(MissReason::NotFound));
        assert_eq!(result.cover, FieldOutcome::Unavailable(MissReason::NotFound));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let http = Arc::new(ScriptedHttp {
            lyrics: Some(HttpResponse::new(500, "boom")),
            ..Default::default()
        });

        let result = enricher(http)
            .fetch_remote(
                &descriptor(Some("Artist"), None),
                FieldSet::only(EnrichmentField::Lyrics),
            )
            .await;

        assert!(matches!(
            result.lyrics,
            FieldOutcome::Unavailable(MissReason::Error(_))
        ));
        assert_eq!(result.cover, FieldOutcome::NotRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_server_times_out() {
        let http = Arc::new(ScriptedHttp {
            hang: true,
            ..Default::default()
        });

        let result = enricher(http)
            .fetch_remote(
                &descriptor(Some("Artist"), None),
                FieldSet::only(EnrichmentField::Lyrics),
            )
            .await;

        assert_eq!(result.lyrics, FieldOutcome::Unavailable(MissReason::Timeout));
    }
}
