use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clipsync::clipboard::{ClipboardWatcher, MemoryClipboard};
use clipsync::relay::{ChangeEvent, Relay};

fn bench_publish(c: &mut Criterion) {
    let relay = Relay::new();
    let bridge = relay.bridge();
    let delivered = Arc::new(AtomicUsize::new(0));
    let _subscriptions: Vec<_> = (0..8)
        .map(|_| {
            let delivered = Arc::clone(&delivered);
            bridge.subscribe(move |event| {
                delivered.fetch_add(event.text().len(), Ordering::Relaxed);
            })
        })
        .collect();

    let event = ChangeEvent::new("copied text of a typical length for a clipboard entry");
    c.bench_function("publish_8_subscribers", |b| {
        b.iter(|| relay.publish(black_box(&event)))
    });
}

fn bench_tick(c: &mut Criterion) {
    let clipboard = MemoryClipboard::with_text("unchanged");
    let mut watcher = ClipboardWatcher::new(Box::new(clipboard.clone()), Relay::new());
    watcher.capture_baseline();

    c.bench_function("tick_unchanged", |b| b.iter(|| black_box(watcher.tick())));

    let mut flip = false;
    c.bench_function("tick_changed", |b| {
        b.iter(|| {
            flip = !flip;
            clipboard.set_text(if flip { "first" } else { "second" });
            black_box(watcher.tick())
        })
    });
}

criterion_group!(benches, bench_publish, bench_tick);
criterion_main!(benches);
