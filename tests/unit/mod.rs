mod recovery_tests;
mod snapshot_tests;
mod validation_tests;
mod wal_replay_tests;
