//! End-to-end blocking bridge tests: wait, timed wait, drivable executors,
//! and the deferred-placeholder rendezvous.

use promissory::test_utils::init_test_logging;
use promissory::{
    make_future, test_complete, test_phase, Error, ErrorKind, Executor, ManualExecutor, Promise,
    ThreadPoolExecutor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

#[test]
fn get_blocks_until_a_threaded_producer_fulfils() {
    init_test("get_blocks_until_a_threaded_producer_fulfils");
    let (mut p, sf) = Promise::pair();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        p.set_value(11).expect("set");
    });
    assert_eq!(sf.get().expect("value"), 11);
    producer.join().expect("producer");
    test_complete!("get_blocks_until_a_threaded_producer_fulfils");
}

#[test]
fn wait_returns_a_ready_handle() {
    init_test("wait_returns_a_ready_handle");
    let (mut p, sf) = Promise::pair();
    let producer = thread::spawn(move || {
        p.set_value(1).expect("set");
    });
    let ready = sf.wait();
    assert!(ready.is_ready());
    assert!(ready.has_value());
    producer.join().expect("producer");
    test_complete!("wait_returns_a_ready_handle");
}

#[test]
fn timed_get_times_out_and_reports_timeout() {
    init_test("timed_get_times_out_and_reports_timeout");
    let (_p, sf) = Promise::<i32>::pair();
    let err = sf
        .get_for(Duration::from_millis(15))
        .expect_err("nothing fulfils");
    assert!(err.is_timeout());
    test_complete!("timed_get_times_out_and_reports_timeout");
}

#[test]
fn timed_wait_leaves_the_handle_usable() {
    init_test("timed_wait_leaves_the_handle_usable");
    let (mut p, sf) = Promise::pair();
    let waited = sf.wait_for(Duration::from_millis(10));
    assert!(!waited.is_ready());

    p.set_value(2).expect("set");
    assert_eq!(waited.get().expect("value"), 2);
    test_complete!("timed_wait_leaves_the_handle_usable");
}

#[test]
fn future_timed_get_after_late_fulfilment_still_delivers() {
    init_test("future_timed_get_after_late_fulfilment_still_delivers");
    let (mut p, sf) = Promise::pair();
    let f = sf.into_unsafe_future().then_value(|x: i32| x * 2);
    let f = f.wait_for(Duration::from_millis(10));
    assert!(!f.is_ready());

    p.set_value(4).expect("set");
    assert_eq!(f.get().expect("value"), 8);
    test_complete!("future_timed_get_after_late_fulfilment_still_delivers");
}

#[test]
fn deferred_chain_runs_on_the_waiter_thread() {
    init_test("deferred_chain_runs_on_the_waiter_thread");
    let waiter = thread::current().id();
    let (mut p, sf) = Promise::pair();
    let chained = sf.defer_value(move |x: i32| {
        assert_eq!(thread::current().id(), waiter, "deferred work runs on the waiter");
        x + 1
    });

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(15));
        p.set_value(1).expect("set");
    });
    assert_eq!(chained.get().expect("value"), 2);
    producer.join().expect("producer");
    test_complete!("deferred_chain_runs_on_the_waiter_thread");
}

#[test]
fn deferred_timed_wait_reverts_and_later_succeeds() {
    init_test("deferred_timed_wait_reverts_and_later_succeeds");
    let (mut p, sf) = Promise::pair();
    let chained = sf.defer_value(|x: i32| x * 10);

    // First wait times out and reverts the placeholder rendezvous.
    let chained = chained.wait_for(Duration::from_millis(10));
    assert!(!chained.is_ready());

    // The producer then fulfils and a second blocking drain completes.
    p.set_value(3).expect("set");
    assert_eq!(chained.get().expect("value"), 30);
    test_complete!("deferred_timed_wait_reverts_and_later_succeeds");
}

#[test]
fn deferred_timed_get_timeout_detaches_the_work() {
    init_test("deferred_timed_get_timeout_detaches_the_work");
    let ran = Arc::new(AtomicUsize::new(0));
    let (mut p, sf) = Promise::pair();
    let r = Arc::clone(&ran);
    let chained = sf.defer_value(move |x: i32| {
        r.fetch_add(1, Ordering::SeqCst);
        x
    });

    let err = chained
        .get_for(Duration::from_millis(10))
        .expect_err("timeout");
    assert!(err.is_timeout());

    // A late fulfilment finds the placeholder detached; the work is dropped.
    p.set_value(1).expect("set");
    thread::sleep(Duration::from_millis(10));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    test_complete!("deferred_timed_get_timeout_detaches_the_work");
}

#[test]
fn wait_via_drives_the_manual_executor() {
    init_test("wait_via_drives_the_manual_executor");
    let driver = Arc::new(ManualExecutor::new());
    let (mut p, sf) = Promise::pair();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(15));
        p.set_value(6).expect("set");
    });

    let value = sf
        .via(Arc::clone(&driver) as Arc<dyn Executor>)
        .then_value(|x: i32| x + 1)
        .get_via(&driver)
        .expect("driven to completion");
    assert_eq!(value, 7);
    producer.join().expect("producer");
    test_complete!("wait_via_drives_the_manual_executor");
}

#[test]
fn timed_wait_via_gives_up_at_the_deadline() {
    init_test("timed_wait_via_gives_up_at_the_deadline");
    let driver = Arc::new(ManualExecutor::new());
    let (_p, sf) = Promise::<i32>::pair();

    let err = sf
        .via(Arc::clone(&driver) as Arc<dyn Executor>)
        .get_via_timed(&driver, Duration::from_millis(20))
        .expect_err("never fulfilled");
    assert!(err.is_timeout());
    test_complete!("timed_wait_via_gives_up_at_the_deadline");
}

#[test]
fn get_surfaces_chain_errors() {
    init_test("get_surfaces_chain_errors");
    let err = make_future(1)
        .then_try(|_| promissory::Try::<i32>::err(Error::user("downstream")))
        .get()
        .expect_err("chain failed");
    assert_eq!(err.kind(), ErrorKind::User);
    test_complete!("get_surfaces_chain_errors");
}

#[test]
fn blocking_bridge_works_against_a_pool_producer() {
    init_test("blocking_bridge_works_against_a_pool_producer");
    let pool = ThreadPoolExecutor::new(2);
    let (mut p, sf) = Promise::pair();
    pool.add(Box::new(move || {
        thread::sleep(Duration::from_millis(10));
        p.set_value(99).expect("set");
    }));
    assert_eq!(
        sf.via(Arc::clone(&pool) as Arc<dyn Executor>)
            .then_value(|x: i32| x + 1)
            .get()
            .expect("value"),
        100
    );
    test_complete!("blocking_bridge_works_against_a_pool_producer");
}
