//! Stress tests for concurrent shard lifecycle operations
