#![expect(clippy::same_name_method, reason = "mock magic")]

use std::time::Duration;

use mockall::mock;

use crate::{Executor, Rejected, Work};

mock! {
    #[derive(Debug)]
    pub Executor {}

    impl Executor for Executor {
        fn execute(&self, work: Work) -> Result<(), Rejected>;
        fn shutdown(&self);
        fn is_terminated(&self) -> bool;
        fn await_termination(&self, timeout: Duration) -> bool;
        fn is_executor_thread(&self) -> bool;
    }
}
