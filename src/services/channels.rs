//! Channel registry - per-location routing of sensor readings and
//! co-location checks
//!
//! Every facility owns one channel keyed by its id. An item is subscribed
//! to exactly one channel at a time; the registry keeps an item→location
//! index alongside the subscriber sets so both views always agree.
//!
//! Dispatch is an explicit loop over the subscribers of one channel, each
//! item evaluating the message against its own categories.

use crate::domain::item::Item;
use crate::domain::record::ViolationRecord;
use crate::domain::types::{FacilityId, ItemTag, SensorReading, Tick};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no channel for facility {0}")]
    UnknownChannel(FacilityId),
    #[error("{item} is already subscribed at {at}")]
    AlreadySubscribed { item: ItemTag, at: FacilityId },
}

/// Message published to a channel
#[derive(Debug, Clone, Copy)]
pub enum ChannelMessage<'a> {
    /// Environmental reading taken at the channel's facility
    Sensor(&'a SensorReading),
    /// `loaded` just joined the channel; everyone else checks against it
    ColocationCheck { tick: Tick, loaded: &'a Item },
}

/// Result of moving a subscription between channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Item was subscribed at the expected source
    pub was_at_source: bool,
    /// Where the item actually was before the move
    pub previous: Option<FacilityId>,
}

#[derive(Debug, Default)]
struct Channel {
    subscribers: BTreeSet<ItemTag>,
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: FxHashMap<FacilityId, Channel>,
    locations: FxHashMap<ItemTag, FacilityId>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a facility. Returns false if it already existed.
    pub fn create_channel(&mut self, id: FacilityId) -> bool {
        if self.channels.contains_key(&id) {
            return false;
        }
        self.channels.insert(id, Channel::default());
        true
    }

    /// Initial subscription of an item that is not yet anywhere
    pub fn subscribe(&mut self, item: ItemTag, channel: FacilityId) -> Result<(), ChannelError> {
        if let Some(&at) = self.locations.get(&item) {
            return Err(ChannelError::AlreadySubscribed { item, at });
        }
        let target = self.channels.get_mut(&channel).ok_or(ChannelError::UnknownChannel(channel))?;
        target.subscribers.insert(item);
        self.locations.insert(item, channel);
        Ok(())
    }

    /// Remove an item from a channel. Returns false if it was not subscribed there.
    pub fn unsubscribe(&mut self, item: ItemTag, channel: FacilityId) -> bool {
        let removed =
            self.channels.get_mut(&channel).is_some_and(|c| c.subscribers.remove(&item));
        if removed {
            self.locations.remove(&item);
        }
        removed
    }

    /// Move an item from `from` to `to`.
    ///
    /// If the item was not at `from`, it is removed from wherever it
    /// actually was, so it still ends up subscribed at `to` only. The
    /// caller reports the mismatch.
    pub fn move_subscription(
        &mut self,
        item: ItemTag,
        from: FacilityId,
        to: FacilityId,
    ) -> Result<MoveOutcome, ChannelError> {
        if !self.channels.contains_key(&to) {
            return Err(ChannelError::UnknownChannel(to));
        }

        let previous = self.locations.get(&item).copied();
        let was_at_source = self.unsubscribe(item, from);
        if !was_at_source {
            if let Some(actual) = previous {
                self.unsubscribe(item, actual);
            }
        }

        if let Some(target) = self.channels.get_mut(&to) {
            target.subscribers.insert(item);
        }
        self.locations.insert(item, to);
        trace!(item = %item, from = %from, to = %to, was_at_source = %was_at_source, "subscription_moved");
        Ok(MoveOutcome { was_at_source, previous })
    }

    pub fn location_of(&self, item: ItemTag) -> Option<FacilityId> {
        self.locations.get(&item).copied()
    }

    /// Subscribers of a channel in tag order (empty for unknown channels)
    pub fn subscribers(&self, channel: FacilityId) -> impl Iterator<Item = ItemTag> + '_ {
        self.channels.get(&channel).into_iter().flat_map(|c| c.subscribers.iter().copied())
    }

    pub fn subscriber_count(&self, channel: FacilityId) -> usize {
        self.channels.get(&channel).map_or(0, |c| c.subscribers.len())
    }

    pub fn is_subscribed(&self, item: ItemTag, channel: FacilityId) -> bool {
        self.channels.get(&channel).is_some_and(|c| c.subscribers.contains(&item))
    }

    /// Number of channels listing this item. 1 for every placed item.
    pub fn subscription_count(&self, item: ItemTag) -> usize {
        self.channels.values().filter(|c| c.subscribers.contains(&item)).count()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver a message to every subscriber of `channel` and collect the
    /// violations they report.
    pub fn dispatch(
        &self,
        channel: FacilityId,
        message: ChannelMessage<'_>,
        items: &FxHashMap<ItemTag, Item>,
    ) -> Vec<ViolationRecord> {
        let mut violations = Vec::new();
        for tag in self.subscribers(channel) {
            let Some(item) = items.get(&tag) else {
                continue;
            };
            match message {
                ChannelMessage::Sensor(reading) => {
                    let rules = item.evaluate_sensor(reading);
                    if !rules.is_empty() {
                        violations.push(ViolationRecord::sensor(reading, item, rules));
                    }
                }
                ChannelMessage::ColocationCheck { tick, loaded } => {
                    if tag == loaded.tag() {
                        continue;
                    }
                    if !item.is_compatible_with(loaded) {
                        violations.push(ViolationRecord::colocation(tick, item, channel, loaded));
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::{Category, CategorySet, TempBand};
    use crate::domain::record::ViolationDetail;
    use crate::domain::rules::Rule;
    use crate::domain::types::Metric;

    fn fid(n: u128) -> FacilityId {
        FacilityId::from_u128(n)
    }

    fn item(n: u128, cats: CategorySet) -> Item {
        Item::new(ItemTag::from_u128(n), cats)
    }

    fn registry_with(channels: &[u128]) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        for &c in channels {
            assert!(registry.create_channel(fid(c)));
        }
        registry
    }

    #[test]
    fn test_create_channel_once() {
        let mut registry = registry_with(&[1]);
        assert!(!registry.create_channel(fid(1)));
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn test_subscribe_places_item_once() {
        let mut registry = registry_with(&[1, 2]);
        let tag = ItemTag::from_u128(10);

        registry.subscribe(tag, fid(1)).unwrap();
        assert_eq!(registry.location_of(tag), Some(fid(1)));
        assert_eq!(
            registry.subscribe(tag, fid(2)),
            Err(ChannelError::AlreadySubscribed { item: tag, at: fid(1) })
        );
        assert_eq!(registry.subscription_count(tag), 1);
        assert_eq!(
            registry.subscribe(ItemTag::from_u128(11), fid(9)),
            Err(ChannelError::UnknownChannel(fid(9)))
        );
    }

    #[test]
    fn test_move_subscription() {
        let mut registry = registry_with(&[1, 2]);
        let tag = ItemTag::from_u128(10);
        registry.subscribe(tag, fid(1)).unwrap();

        let outcome = registry.move_subscription(tag, fid(1), fid(2)).unwrap();
        assert!(outcome.was_at_source);
        assert_eq!(outcome.previous, Some(fid(1)));
        assert!(registry.is_subscribed(tag, fid(2)));
        assert!(!registry.is_subscribed(tag, fid(1)));
        assert_eq!(registry.subscription_count(tag), 1);
    }

    #[test]
    fn test_move_from_wrong_source_still_single_subscription() {
        let mut registry = registry_with(&[1, 2, 3]);
        let tag = ItemTag::from_u128(10);
        registry.subscribe(tag, fid(3)).unwrap();

        let outcome = registry.move_subscription(tag, fid(1), fid(2)).unwrap();
        assert!(!outcome.was_at_source);
        assert_eq!(outcome.previous, Some(fid(3)));
        assert_eq!(registry.location_of(tag), Some(fid(2)));
        assert_eq!(registry.subscription_count(tag), 1);
        assert_eq!(registry.subscriber_count(fid(3)), 0);
    }

    #[test]
    fn test_unsubscribe_missing_returns_false() {
        let mut registry = registry_with(&[1]);
        assert!(!registry.unsubscribe(ItemTag::from_u128(5), fid(1)));
        assert!(!registry.unsubscribe(ItemTag::from_u128(5), fid(7)));
    }

    #[test]
    fn test_dispatch_sensor_only_reaches_subscribers() {
        let mut registry = registry_with(&[1, 2]);
        let frozen = item(1, CategorySet::EMPTY.with_band(TempBand::Frozen));
        let elsewhere = item(2, CategorySet::EMPTY.with_band(TempBand::Frozen));
        let unbanded = item(3, CategorySet::of(&[Category::Fragile]));
        registry.subscribe(frozen.tag(), fid(1)).unwrap();
        registry.subscribe(unbanded.tag(), fid(1)).unwrap();
        registry.subscribe(elsewhere.tag(), fid(2)).unwrap();
        let items: FxHashMap<ItemTag, Item> =
            [frozen.clone(), elsewhere, unbanded].into_iter().map(|i| (i.tag(), i)).collect();

        let reading = SensorReading::new(Tick(1), fid(1), Metric::Temp, 10.0);
        let violations = registry.dispatch(fid(1), ChannelMessage::Sensor(&reading), &items);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].item, frozen.tag());
        assert_eq!(violations[0].rules(), &[Rule::Temp]);
    }

    #[test]
    fn test_colocation_check_skips_loaded_item() {
        let mut registry = registry_with(&[1]);
        let edible = item(1, CategorySet::of(&[Category::Edible]));
        let fragile = item(2, CategorySet::of(&[Category::Fragile]));
        let hazardous = item(3, CategorySet::of(&[Category::Hazardous]));
        for i in [&edible, &fragile, &hazardous] {
            registry.subscribe(i.tag(), fid(1)).unwrap();
        }
        let items: FxHashMap<ItemTag, Item> =
            [edible.clone(), fragile, hazardous.clone()].into_iter().map(|i| (i.tag(), i)).collect();

        let violations = registry.dispatch(
            fid(1),
            ChannelMessage::ColocationCheck { tick: Tick(4), loaded: &hazardous },
            &items,
        );

        // Hazardous is incompatible with itself but never checks against itself
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].item, edible.tag());
        match &violations[0].detail {
            ViolationDetail::Colocation { loaded, .. } => assert_eq!(*loaded, hazardous.tag()),
            other => panic!("unexpected detail {other:?}"),
        }
    }
}
