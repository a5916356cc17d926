//! Cooperative runtime.
//!
//! One thread, one `edge-executor` `LocalExecutor`, three tasks:
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  futures_lite::block_on                                  │
//!  │  ┌────────────────────────────────────────────────────┐  │
//!  │  │  LocalExecutor                                     │  │
//!  │  │  ┌─────────────┐  ┌─────────────┐  ┌────────────┐  │  │
//!  │  │  │ Scheduler   │  │ Radio pump  │  │ Net pump   │  │  │
//!  │  │  │ sleep until │  │ wake on     │  │ wake on    │  │  │
//!  │  │  │ next due ⏱  │  │ RADIO_EVENTS│  │ NET_EVENTS │  │  │
//!  │  │  └─────────────┘  └─────────────┘  └────────────┘  │  │
//!  │  └────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The node lives in an `Rc<RefCell<_>>`. Each task borrows it for one
//! event or one scheduler pass and releases it before awaiting, so no
//! borrow ever spans a suspension point.

use core::cell::RefCell;
use core::future::Future;
use core::time::Duration;
use std::rc::Rc;

use embedded_hal::digital::OutputPin;
use log::info;

use crate::app::ports::{Clock, EventSink, NetworkLink, PeripheralRadio, TelemetryTransport};
use crate::app::service::NodeService;
use crate::drivers::watchdog::Watchdog;
use crate::events::{NET_EVENTS, RADIO_EVENTS};
use crate::scheduler::Scheduler;

/// Longest scheduler sleep, so the watchdog is fed even with every task
/// disabled.
const MAX_IDLE_MS: u64 = 1000;

type Shared<N> = Rc<RefCell<N>>;

async fn scheduler_loop<R, L, T, P, C, S>(
    node: Shared<NodeService<R, L, T, P, C, S>>,
    mut sched: Scheduler,
    watchdog: Rc<Watchdog>,
) where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    loop {
        let now = {
            let mut n = node.borrow_mut();
            n.set_queue_drops(RADIO_EVENTS.dropped(), NET_EVENTS.dropped());
            let now = n.now_ms();
            sched.tick(now, &mut *n);
            now
        };
        watchdog.feed();

        let wait = sched
            .next_deadline()
            .map_or(MAX_IDLE_MS, |due| due.saturating_sub(now).min(MAX_IDLE_MS));
        async_io_mini::Timer::after(Duration::from_millis(wait)).await;
    }
}

async fn radio_pump<R, L, T, P, C, S>(node: Shared<NodeService<R, L, T, P, C, S>>)
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    loop {
        let event = RADIO_EVENTS.next().await;
        node.borrow_mut().handle_radio_event(event);
    }
}

async fn net_pump<R, L, T, P, C, S>(node: Shared<NodeService<R, L, T, P, C, S>>)
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    loop {
        let event = NET_EVENTS.next().await;
        node.borrow_mut().handle_net_event(event);
    }
}

/// Shared handle to a node driven by the runtime.
pub type SharedNode<R, L, T, P, C, S> = Shared<NodeService<R, L, T, P, C, S>>;

/// Start the node and drive it until `until` completes, then stop it.
/// The caller keeps its handle and can inspect the node afterwards.
pub fn run_until<R, L, T, P, C, S>(
    node: &SharedNode<R, L, T, P, C, S>,
    watchdog: Watchdog,
    until: impl Future<Output = ()>,
) where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    let sched = {
        let mut n = node.borrow_mut();
        let sched = Scheduler::with_node_tasks(&n.config().timing, n.now_ms());
        n.start();
        sched
    };

    let watchdog = Rc::new(watchdog);
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    executor
        .spawn(scheduler_loop(node.clone(), sched, watchdog))
        .detach();
    executor.spawn(radio_pump(node.clone())).detach();
    executor.spawn(net_pump(node.clone())).detach();

    info!("Runtime: scheduler and event pumps running");
    futures_lite::future::block_on(executor.run(until));

    node.borrow_mut().stop();
    info!("Runtime: stopped");
}

/// Drive `node` forever.
pub fn run<R, L, T, P, C, S>(node: NodeService<R, L, T, P, C, S>, watchdog: Watchdog)
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    let node = Rc::new(RefCell::new(node));
    run_until(&node, watchdog, core::future::pending::<()>());
}

/// Drive `node` for `duration` of wall time.
pub fn run_for<R, L, T, P, C, S>(
    node: &SharedNode<R, L, T, P, C, S>,
    watchdog: Watchdog,
    duration: Duration,
) where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    run_until(node, watchdog, async move {
        async_io_mini::Timer::after(duration).await;
    });
}
