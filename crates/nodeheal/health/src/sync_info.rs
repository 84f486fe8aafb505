//! Per-pod sync info derived from a status snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use nodeheal_types::SyncInfoPodStatus;

use crate::collector::StatusItem;

/// Derive this cycle's sync info from `items` and the previously persisted map.
///
/// `last_block_timestamp` carries over while the height is unchanged (or the
/// pod could not be queried) and resets to the observation time otherwise,
/// so `height_retain_time` measures how long the height has been flat.
pub fn derive_sync_info(
    items: &[StatusItem],
    previous: &BTreeMap<String, SyncInfoPodStatus>,
) -> BTreeMap<String, SyncInfoPodStatus> {
    items
        .iter()
        .map(|item| {
            let before = previous.get(&item.pod.name);
            let timestamp = item.observed_at;

            let last_block_timestamp = match (&item.error, before) {
                (Some(_), Some(before)) => before.last_block_timestamp,
                (Some(_), None) => timestamp,
                (None, Some(before))
                    if before.height.is_some() && before.height == item.height =>
                {
                    before.last_block_timestamp
                }
                (None, _) => timestamp,
            };

            let (height, in_sync) = if item.error.is_some() {
                (None, None)
            } else {
                (item.height, item.in_sync)
            };

            let height_retain_time = timestamp
                .signed_duration_since(last_block_timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);

            let status = SyncInfoPodStatus {
                timestamp,
                height,
                in_sync,
                error: item.error.clone(),
                last_block_timestamp,
                height_retain_time,
            };
            (item.pod.name.clone(), status)
        })
        .collect()
}
