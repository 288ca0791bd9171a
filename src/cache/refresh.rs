//! A single refresh attempt: probe, maybe download, decode, extract, commit

use chrono::Utc;
use chrono_tz::Tz;

use crate::client::Upstream;
use crate::error::FeedError;
use crate::extract::extract_events;
use crate::fingerprint::HashingReader;
use crate::ical::Decoder;

use super::store::{Store, Update};

/// Refresh `store` from `upstream`.
///
/// `store` is only modified once everything succeeded. On error, it is left exactly as it was.
pub(crate) async fn run<U, D>(upstream: &U, decoder: &D, store: &mut Store, default_tz: Tz) -> Result<(), FeedError>
where
    U: Upstream + ?Sized,
    D: Decoder,
{
    let probe = upstream.probe().await
        .map_err(|err| FeedError::transport("probing feed", err))?;

    let upstream_last_modified = probe.last_modified();
    if let Some(stamp) = upstream_last_modified {
        if store.is_unchanged_since(stamp) {
            log::debug!("Feed has not changed since {}, not downloading it", stamp);
            return Ok(());
        }
    }

    let body = upstream.download().await
        .map_err(|err| FeedError::transport("downloading feed", err))?;
    let fetched_at = Utc::now();

    // The body is fingerprinted while the decoder reads it
    let mut reader = HashingReader::new(body.as_slice());
    let decoded = decoder.decode(&mut reader);
    let fingerprint = reader.finish();
    let entries = decoded.map_err(FeedError::decode)?;

    let events = match entries {
        None => {
            log::info!("Feed contains no calendar");
            Vec::new()
        },
        Some(entries) => extract_events(&entries, default_tz)?,
    };

    log::info!("Refreshed feed: {} events (fingerprint {})", events.len(), fingerprint);
    store.commit(Update {
        events,
        upstream_last_modified,
        fingerprint,
        fetched_at,
    });
    Ok(())
}
