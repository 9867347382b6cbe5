//! Creates a client factory, assigns a few endpoints and shows which worker each one got.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use transport_factory::{
    ClientSocketFactory, EndpointState, ExecutorHandle, MultiplexerEntity, ThreadExecutor,
};

fn main() -> Result<(), transport_factory::Error> {
    let boss: ExecutorHandle = Arc::new(ThreadExecutor::new("boss"));
    let workers: ExecutorHandle = Arc::new(ThreadExecutor::new("worker"));

    let factory = ClientSocketFactory::builder()
        .boss_executor(boss)
        .worker_executor(workers)
        .worker_count(3)
        .build()?;

    println!(
        "Factory uses {} at constraint level {} with {} workers",
        factory.provider().identity(),
        factory.constraint_level(),
        factory.worker_count()
    );

    let remote = SocketAddr::from(([127, 0, 0, 1], 7));

    let endpoints = (0..6)
        .map(|i| factory.new_channel(format!("pipeline-{i}")))
        .collect::<Result<Vec<_>, _>>()?;

    for endpoint in &endpoints {
        endpoint.connect(remote)?;
    }

    while endpoints
        .iter()
        .any(|endpoint| endpoint.state() != EndpointState::Registered)
    {
        thread::sleep(Duration::from_millis(10));
    }

    for endpoint in &endpoints {
        println!(
            "{} ({}) is registered with worker {}",
            endpoint.id(),
            endpoint.pipeline(),
            endpoint.worker().index()
        );
    }

    for worker in factory.workers() {
        println!(
            "Worker {} has {} registered endpoints",
            worker.index(),
            worker.registered_endpoints()
        );
    }

    factory.release_external_resources();

    Ok(())
}
