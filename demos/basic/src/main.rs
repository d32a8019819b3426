/**
 * Minimal tour of the Kestrel concurrency toolkit.
 *
 *   cargo run -p kestrel_demo
 *
 * Walks through the three layers: a worker event loop receiving queued
 * signal deliveries, a repeating timer bound to that loop, and an
 * application shutdown round with acknowledged cleanup.
 */
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kestrel::{
    build, Application, ConnectionType, EventLoop, Id, Object, ObjectBase, Signal, Timer,
};

/// Receives greetings on the worker loop and counts timer ticks.
struct Greeter {
    base: ObjectBase,
    ticks: AtomicU32,
}

impl Greeter {
    fn create(event_loop: Arc<EventLoop>) -> Arc<Self> {
        build(Self {
            base: ObjectBase::new(Some(event_loop)),
            ticks: AtomicU32::new(0),
        })
    }

    fn on_greeting(&self, text: String) {
        println!("[worker] {text}");
    }

    fn on_tick(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[worker] tick {tick}");
    }
}

impl Object for Greeter {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

/// Acknowledges the application's cleanup request with its id.
struct Janitor {
    base: ObjectBase,
    name: &'static str,
    signal_finished_cleanup: Signal<Id>,
}

impl Janitor {
    fn create(event_loop: Arc<EventLoop>, name: &'static str) -> Arc<Self> {
        build(Self {
            base: ObjectBase::new(Some(event_loop)),
            name,
            signal_finished_cleanup: Signal::new(),
        })
    }

    fn on_cleanup(&self) {
        println!("[cleanup] {} done", self.name);
        self.signal_finished_cleanup.emit(self.base.id());
    }
}

impl Object for Janitor {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

fn main() -> Result<(), String> {
    env_logger::init();

    /*
     * A worker loop draining in its own thread, and an object whose
     * queued slots execute there.
     */
    let worker_loop = Arc::new(EventLoop::new());
    let worker = EventLoop::launch_in_thread(Arc::clone(&worker_loop))?;
    let greeter = Greeter::create(Arc::clone(&worker_loop));

    /*
     * Queued (the default) defers onto the worker loop; Direct runs
     * right here on the main thread.
     */
    let greeting = Signal::<String>::new();
    greeting.connect(&greeter, |g, text| g.on_greeting(text));
    greeting.emit("queued delivery".into());

    let immediate = Signal::<String>::new();
    immediate.connect_with_type(
        &greeter,
        |_g, text| println!("[main] {text}"),
        ConnectionType::Direct,
    );
    immediate.emit("direct delivery".into());

    /*
     * A repeating timer bound to the worker loop. Three ticks, then
     * stop — is_active stays true until we say otherwise.
     */
    let timer = Timer::create(Arc::clone(&worker_loop));
    timer.signal_timeout.connect(&greeter, |g, ()| g.on_tick());
    timer.start(Duration::from_millis(100), true)?;
    while greeter.ticks.load(Ordering::SeqCst) < 3 {
        std::thread::sleep(Duration::from_millis(10));
    }
    timer.stop();
    EventLoop::remove_from_thread(&worker_loop, worker, true);

    /*
     * Application shutdown round: two janitors, one on the primary
     * loop and one on a second worker loop. Emitting the cleanup
     * signal fans out; run() returns once both have acknowledged.
     */
    let app = Application::create();
    let alt_loop = Arc::new(EventLoop::new());
    let alt_worker = EventLoop::launch_in_thread(Arc::clone(&alt_loop))?;

    let janitors = [
        Janitor::create(Arc::clone(app.event_loop()), "primary-loop janitor"),
        Janitor::create(Arc::clone(&alt_loop), "worker-loop janitor"),
    ];
    for janitor in &janitors {
        app.add_cleanup_request(janitor);
        app.signal_start_cleanup.connect(janitor, |j, ()| j.on_cleanup());
        janitor
            .signal_finished_cleanup
            .connect(&app, |a, id| a.on_finished_cleanup(id));
    }

    app.signal_start_cleanup.emit(());
    let code = app.run();
    EventLoop::remove_from_thread(&alt_loop, alt_worker, true);
    println!("[main] application exited with {code}");

    Ok(())
}
