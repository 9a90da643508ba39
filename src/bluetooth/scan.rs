/// Turning raw discovery sightings into fresh named advertisements
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use log::debug;
use std::collections::HashSet;

use super::adapter::Advertisement;

/// One discovery report for a device, named or not yet named
///
/// A discovery stream first replays every device the stack already knows
/// about, then reports a device again whenever it is heard or one of its
/// properties changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub id: String,
    pub name: Option<String>,
}

/// Per-scan bookkeeping for [`fresh_advertisements`]
#[derive(Debug, Default)]
struct SightingFilter {
    // Cached devices whose replayed entry has not been consumed yet
    replay_pending: HashSet<String>,
    announced: HashSet<String>,
}

impl SightingFilter {
    fn new(cached: HashSet<String>) -> Self {
        SightingFilter {
            replay_pending: cached,
            announced: HashSet::new(),
        }
    }

    fn accept(&mut self, sighting: Sighting) -> Option<Advertisement> {
        if self.replay_pending.remove(&sighting.id) {
            debug!("Skipping cached entry {}", sighting.id);
            return None;
        }
        if self.announced.contains(&sighting.id) {
            return None;
        }
        // Unnamed devices are reported again once the scan response names them
        let name = sighting.name?;
        self.announced.insert(sighting.id.clone());
        Some(Advertisement {
            id: sighting.id,
            name,
        })
    }
}

/// Filter a discovery stream down to devices heard during this scan
///
/// `cached` holds the ids known before discovery started. Their replayed
/// entries are dropped; a later report for the same id means the device is
/// advertising now. Each device is announced once, as soon as it has a name.
pub fn fresh_advertisements(
    cached: HashSet<String>,
    sightings: BoxStream<'static, Sighting>,
) -> BoxStream<'static, Advertisement> {
    let mut filter = SightingFilter::new(cached);
    sightings
        .filter_map(move |sighting| future::ready(filter.accept(sighting)))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn seen(id: &str, name: Option<&str>) -> Sighting {
        Sighting {
            id: id.to_string(),
            name: name.map(String::from),
        }
    }

    async fn run(cached: &[&str], sightings: Vec<Sighting>) -> Vec<Advertisement> {
        let cached = cached.iter().map(|id| id.to_string()).collect();
        fresh_advertisements(cached, stream::iter(sightings).boxed())
            .collect()
            .await
    }

    #[tokio::test]
    async fn replayed_cache_entries_are_dropped() {
        let ads = run(
            &["A"],
            vec![seen("A", Some("VC_SENS_1")), seen("B", Some("Other"))],
        )
        .await;
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].id, "B");
    }

    #[tokio::test]
    async fn cached_device_heard_again_is_announced() {
        let ads = run(
            &["A"],
            vec![seen("A", Some("VC_SENS_1")), seen("A", Some("VC_SENS_1"))],
        )
        .await;
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].name, "VC_SENS_1");
    }

    #[tokio::test]
    async fn late_name_is_announced_once() {
        let ads = run(
            &[],
            vec![
                seen("A", None),
                seen("A", Some("VC_SENS_1")),
                seen("A", Some("VC_SENS_1")),
            ],
        )
        .await;
        assert_eq!(
            ads,
            vec![Advertisement {
                id: "A".to_string(),
                name: "VC_SENS_1".to_string(),
            }]
        );
    }
}
