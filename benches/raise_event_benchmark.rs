use async_best_practices::{EventArgs, EventHandler, HandlerMethod, WeakEventManager};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Listener {
    hits: AtomicUsize,
}

fn listener_handler(listener: &Arc<Listener>) -> EventHandler<EventArgs> {
    EventHandler::new(
        listener,
        HandlerMethod::from_method("on_changed", |l: &Listener, _, _: &EventArgs| {
            l.hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }),
    )
}

fn bench_raise_live_subscribers(c: &mut Criterion) {
    let manager = WeakEventManager::<EventArgs>::new();
    let listeners: Vec<_> = (0..100)
        .map(|_| {
            Arc::new(Listener {
                hits: AtomicUsize::new(0),
            })
        })
        .collect();
    for listener in &listeners {
        manager.add_event_handler(&listener_handler(listener), "Changed").unwrap();
    }

    c.bench_function("raise 100 live subscribers", |b| {
        b.iter(|| manager.raise_event(None, black_box(&EventArgs::EMPTY), "Changed").unwrap())
    });
}

fn bench_raise_with_pruning(c: &mut Criterion) {
    c.bench_function("raise pruning 50 of 100 subscribers", |b| {
        b.iter_batched(
            || {
                let manager = WeakEventManager::<EventArgs>::new();
                let mut kept = vec![];
                for i in 0..100 {
                    let listener = Arc::new(Listener {
                        hits: AtomicUsize::new(0),
                    });
                    manager.add_event_handler(&listener_handler(&listener), "Changed").unwrap();
                    if i % 2 == 0 {
                        kept.push(listener);
                    }
                }
                (manager, kept)
            },
            |(manager, kept)| {
                manager.raise_event(None, &EventArgs::EMPTY, "Changed").unwrap();
                black_box(kept);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_raise_live_subscribers, bench_raise_with_pruning);
criterion_main!(benches);
