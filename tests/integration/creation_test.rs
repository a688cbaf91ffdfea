//! Shard creation: publication, uniqueness and rollback

use crate::common::{Event, RecordingFactory, TestEnvironment};
use shard_lifecycle::shard::{ShardLockManager, SubsystemKind};
use shard_lifecycle::{Error, ShardState, SubsystemError};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod creation_tests {
    use super::*;

    #[test]
    fn test_create_publishes_shard() {
        let env = TestEnvironment::new("create_publish");
        let service = env.service();

        let shard = crate::assert_ok!(service.create_shard(0));
        assert_eq!(shard.ordinal(), 0);
        assert_eq!(shard.state(), ShardState::Created);
        assert!(shard.holds_lock());
        assert!(env.locks.is_locked(&env.shard_id(0)));

        let found = service.shard(0).unwrap();
        assert!(Arc::ptr_eq(&shard, &found));
        assert_eq!(service.number_of_shards(), 1);
    }

    #[test]
    fn test_listener_order_on_create() {
        let env = TestEnvironment::new("create_listeners");
        let service = env.service();

        service.create_shard(2).unwrap();

        let before = env.journal.position(&Event::BeforeCreated(2)).unwrap();
        let first_build = env
            .journal
            .position(&Event::Built(2, SubsystemKind::Store))
            .unwrap();
        let state = env
            .journal
            .position(&Event::StateChanged(2, None, ShardState::Created))
            .unwrap();
        let after = env.journal.position(&Event::AfterCreated(2)).unwrap();

        assert!(before < first_build);
        assert!(first_build < state);
        assert!(state < after);
    }

    #[test]
    fn test_duplicate_ordinal_rejected() {
        let env = TestEnvironment::new("create_duplicate");
        let service = env.service();

        let original = service.create_shard(0).unwrap();
        env.journal.clear();

        crate::assert_error!(service.create_shard(0), Error::ShardAlreadyExists(_));

        // Nothing was built and the live shard is untouched
        assert!(env.journal.events().is_empty());
        assert_eq!(service.number_of_shards(), 1);
        assert!(Arc::ptr_eq(&original, &service.shard(0).unwrap()));
        assert!(original.holds_lock());
    }

    #[test]
    fn test_failed_wiring_rolls_back() {
        let env = TestEnvironment::new("create_rollback");
        let service = env.service();
        env.factory.fail_build(SubsystemKind::Engine);

        match service.create_shard(0) {
            Err(Error::ShardCreation { shard_id, source }) => {
                assert_eq!(shard_id, env.shard_id(0));
                assert!(matches!(source, SubsystemError::Config(_)));
            }
            other => panic!("expected creation failure, got {:?}", other),
        }

        assert!(!service.has_shard(0));
        assert!(service.shard(0).is_none());
        assert!(!env.locks.is_locked(&env.shard_id(0)));
        assert!(!env.journal.contains(&Event::AfterCreated(0)));

        let mut built = env.journal.built(0);
        built.reverse();
        assert!(!built.is_empty());
        assert_eq!(env.journal.closed(0), built);
    }

    #[test]
    fn test_rollback_at_each_failing_step() {
        let steps = [
            SubsystemKind::Store,
            SubsystemKind::DeletionPolicy,
            SubsystemKind::MergeScheduler,
            SubsystemKind::Translog,
            SubsystemKind::TranslogService,
            SubsystemKind::Gateway,
            SubsystemKind::PercolatorRegistry,
        ];

        for kind in steps {
            let env = TestEnvironment::new("create_rollback_step");
            let service = env.service();
            env.factory.fail_build(kind);

            crate::assert_error!(service.create_shard(0), Error::ShardCreation { .. });
            assert!(!service.has_shard(0), "{} left a shard behind", kind);
            assert!(!env.locks.is_locked(&env.shard_id(0)), "{} kept the lock", kind);

            let mut built = env.journal.built(0);
            built.reverse();
            assert_eq!(env.journal.closed(0), built, "{} rollback order", kind);
        }
    }

    #[test]
    fn test_retry_after_failed_creation() {
        let env = TestEnvironment::new("create_retry");
        let service = env.service();

        env.factory.fail_build(SubsystemKind::Gateway);
        assert!(service.create_shard(1).is_err());

        env.factory.heal();
        let shard = service.create_shard(1).unwrap();
        assert!(Arc::ptr_eq(&shard, &service.shard_safe(1).unwrap()));
    }

    #[test]
    fn test_lock_timeout_when_held_elsewhere() {
        let env = TestEnvironment::new("create_lock_timeout");
        let service = env.service();

        let foreign = env
            .locks
            .acquire(&env.shard_id(0), Duration::from_millis(50))
            .unwrap();

        crate::assert_error!(service.create_shard(0), Error::ShardLockTimeout { .. });
        assert!(!service.has_shard(0));
        assert!(env.journal.events().is_empty());

        foreign.release();
        service.create_shard(0).unwrap();
        assert!(service.has_shard(0));
    }

    #[test]
    fn test_plugin_services_are_part_of_the_shard() {
        let env = TestEnvironment::new("create_plugins");
        let env = {
            let factory = RecordingFactory::new(env.journal.clone()).with_plugins(3);
            env.with_factory(factory)
        };
        let service = env.service();

        let shard = service.create_shard(0).unwrap();
        assert_eq!(shard.bundle().plugins.len(), 3);
        assert_eq!(
            env.journal
                .built(0)
                .iter()
                .filter(|k| **k == SubsystemKind::Plugin)
                .count(),
            3
        );
    }
}
