//! Test doubles shared by unit tests.

use flotilla_core::{EventSink, SupervisorEvent};
use mockall::mock;

mock! {
    pub Sink {}
    impl EventSink for Sink {
        fn emit(&self, event: SupervisorEvent);
    }
}
