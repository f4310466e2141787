/*!
# Watchdock DevKit - Stubs and test utilities

Helpers for exercising the monitor without real hosts or endpoints:
- Recording and failing notification channels
- Static host probe and manual clock
- Manual scheduler and a ready-made engine harness
*/

pub mod channel_stub;
pub mod test_utils;

pub use channel_stub::{FailingChannel, RecordingChannel};
pub use test_utils::{system_metrics, ManualClock, ManualScheduler, StaticProbe, TestHarness};
