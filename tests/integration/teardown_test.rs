//! Shard removal: ordering and best-effort teardown

use crate::common::{CloseBehavior, Event, RecordingFactory, TestEnvironment};
use parking_lot::Mutex;
use shard_lifecycle::index::{IndexComponent, LookupSlot};
use shard_lifecycle::shard::{
    IndexLifecycleListener, Shard, ShardLockManager, ShardLookup, SubsystemKind,
};
use shard_lifecycle::types::ShardId;
use shard_lifecycle::{IndexService, ShardState};
use std::sync::Arc;

use SubsystemKind::*;

/// Records whether the shard is published when each hook fires
#[derive(Default)]
struct VisibilityWatch {
    lookup: LookupSlot,
    seen: Mutex<Vec<(&'static str, bool)>>,
}

impl VisibilityWatch {
    fn record(&self, hook: &'static str, ordinal: u32) {
        let visible = self.lookup.shard(ordinal).is_some();
        self.seen.lock().push((hook, visible));
    }
}

impl IndexComponent for VisibilityWatch {
    fn bind_shard_lookup(&self, lookup: Arc<dyn ShardLookup>) {
        self.lookup.bind(lookup);
    }
}

impl IndexLifecycleListener for VisibilityWatch {
    fn before_shard_created(&self, shard_id: &ShardId) {
        self.record("before_created", shard_id.ordinal());
    }

    fn after_shard_created(&self, shard: &Arc<Shard>) {
        self.record("after_created", shard.ordinal());
    }

    fn before_shard_closed(&self, shard_id: &ShardId, _shard: &Arc<Shard>) {
        self.record("before_closed", shard_id.ordinal());
    }

    fn after_shard_closed(&self, shard_id: &ShardId, _shard: &Arc<Shard>) {
        self.record("after_closed", shard_id.ordinal());
    }
}

#[cfg(test)]
mod teardown_tests {
    use super::*;

    #[test]
    fn test_teardown_order() {
        let env = TestEnvironment::new("teardown_order");
        let env = {
            let factory = RecordingFactory::new(env.journal.clone()).with_plugins(1);
            env.with_factory(factory)
        };
        let service = env.service();

        service.create_shard(0).unwrap();
        env.journal.clear();

        service.remove_shard(0, "rebalance").unwrap();

        assert_eq!(
            env.journal.events(),
            vec![
                Event::BeforeClosed(0),
                Event::Closed(0, Plugin),
                Event::Closed(0, TranslogService),
                Event::StateChanged(0, Some(ShardState::Created), ShardState::Closed),
                Event::Closed(0, Engine),
                Event::Closed(0, MergeScheduler),
                Event::Closed(0, MergePolicy),
                Event::Closed(0, Gateway),
                Event::Closed(0, Translog),
                Event::Closed(0, PercolatorRegistry),
                Event::AfterClosed(0),
                Event::Closed(0, Store),
                Event::Closed(0, Suggest),
                Event::Closed(0, Snapshot),
                Event::Closed(0, TermVectors),
                Event::Closed(0, FieldData),
                Event::Closed(0, BitsetFilterCache),
                Event::Closed(0, QueryCache),
                Event::Closed(0, FilterCache),
                Event::Closed(0, DeletionPolicy),
                Event::ScopeReleased(0),
            ]
        );
    }

    #[test]
    fn test_every_subsystem_closed_once() {
        let env = TestEnvironment::new("teardown_once");
        let service = env.service();

        service.create_shard(0).unwrap();
        service.remove_shard(0, "rebalance").unwrap();

        let mut built = env.journal.built(0);
        let mut closed = env.journal.closed(0);
        built.sort_by_key(|k| k.as_str());
        closed.sort_by_key(|k| k.as_str());
        assert_eq!(built, closed);
    }

    #[test]
    fn test_shard_unreachable_once_removed() {
        let env = TestEnvironment::new("teardown_unreachable");
        let service = env.service();

        let shard = service.create_shard(0).unwrap();
        service.remove_shard(0, "rebalance").unwrap();

        assert!(service.shard(0).is_none());
        assert!(shard.is_closed());
        assert!(!shard.holds_lock());
        crate::assert_error!(
            service.update_shard_state(0, ShardState::Started, "recovered"),
            shard_lifecycle::Error::ShardMissing(_)
        );
        assert!(!env.locks.is_locked(&env.shard_id(0)));
    }

    #[test]
    fn test_failing_engine_close_does_not_stop_teardown() {
        let env = TestEnvironment::new("teardown_engine_error");
        env.factory.on_close(Engine, CloseBehavior::Fail);
        let service = env.service();

        service.create_shard(0).unwrap();
        crate::assert_ok!(service.remove_shard(0, "rebalance"));

        let closed = env.journal.closed(0);
        assert!(closed.contains(&Engine));
        assert!(closed.contains(&MergeScheduler));
        assert!(closed.contains(&Store));
        assert!(closed.contains(&DeletionPolicy));
        assert!(env.journal.contains(&Event::AfterClosed(0)));
        assert!(env.journal.contains(&Event::ScopeReleased(0)));

        assert!(!service.has_shard(0));
        assert!(!env.locks.is_locked(&env.shard_id(0)));
    }

    #[test]
    fn test_panicking_close_does_not_stop_teardown() {
        let env = TestEnvironment::new("teardown_panic");
        env.factory.on_close(Translog, CloseBehavior::Panic);
        env.factory.on_close(Store, CloseBehavior::Fail);
        let service = env.service();

        service.create_shard(0).unwrap();
        crate::assert_ok!(service.remove_shard(0, "rebalance"));

        let closed = env.journal.closed(0);
        assert!(closed.contains(&Translog));
        assert!(closed.contains(&PercolatorRegistry));
        assert!(closed.contains(&FilterCache));
        assert!(!env.locks.is_locked(&env.shard_id(0)));

        // The ordinal can be reused right away
        env.factory.on_close(Translog, CloseBehavior::Succeed);
        env.factory.on_close(Store, CloseBehavior::Succeed);
        service.create_shard(0).unwrap();
        assert!(service.has_shard(0));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let env = TestEnvironment::new("teardown_idempotent");
        let service = env.service();

        service.create_shard(0).unwrap();
        service.remove_shard(0, "first").unwrap();
        env.journal.clear();

        crate::assert_ok!(service.remove_shard(0, "second"));
        crate::assert_ok!(service.remove_shard(42, "never existed"));
        assert!(env.journal.events().is_empty());
    }

    #[test]
    fn test_removing_one_shard_leaves_others() {
        let env = TestEnvironment::new("teardown_isolated");
        let service = env.service();

        service.create_shard(0).unwrap();
        service.create_shard(1).unwrap();
        service.remove_shard(1, "rebalance").unwrap();

        assert!(env.journal.closed(0).is_empty());
        assert_eq!(service.shard(0).unwrap().state(), ShardState::Created);
        assert!(env.locks.is_locked(&env.shard_id(0)));
    }

    #[test]
    fn test_shard_hidden_while_hooks_run() {
        let env = TestEnvironment::new("teardown_visibility");
        let watch = Arc::new(VisibilityWatch::default());
        let service = IndexService::builder(
            env.settings.clone(),
            env.locks.clone(),
            Arc::new(env.factory.clone()),
        )
        .component(watch.clone())
        .listener(watch.clone())
        .build()
        .unwrap();

        service.create_shard(0).unwrap();
        assert!(watch.lookup.shard(0).is_some());
        service.remove_shard(0, "rebalance").unwrap();

        assert_eq!(
            *watch.seen.lock(),
            vec![
                ("before_created", false),
                ("after_created", false),
                ("before_closed", false),
                ("after_closed", false),
            ]
        );
    }
}
