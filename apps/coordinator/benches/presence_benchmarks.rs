use coordinator::models::domain::Identity;
use coordinator::rooms::presence::PresenceTally;
use coordinator::rooms::RoomManager;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn user(n: usize) -> Identity {
    Identity {
        user_id: format!("user-{}", n),
        display_name: format!("User {}", n),
        privileged: false,
    }
}

/// Reference counting with several tabs per user
fn bench_presence_tally(c: &mut Criterion) {
    let mut group = c.benchmark_group("presence_tally");

    for users in [10usize, 100, 1000] {
        let ids: Vec<String> = (0..users).map(|n| format!("user-{}", n)).collect();

        group.bench_with_input(BenchmarkId::new("add_remove", users), &ids, |b, ids| {
            b.iter(|| {
                let mut tally = PresenceTally::new();
                for id in ids {
                    tally.add(id);
                    tally.add(id);
                }
                for id in ids {
                    tally.remove(id);
                    tally.remove(id);
                }
                black_box(tally.watcher_count());
            });
        });
    }

    group.finish();
}

/// Join and leave through the manager, including presence fan-out
fn bench_join_leave(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let mut group = c.benchmark_group("room_membership");
    group.measurement_time(Duration::from_secs(5));

    for watchers in [1usize, 50, 500] {
        let rooms = Arc::new(RoomManager::new(4096));
        let (guards, mut inboxes): (Vec<_>, Vec<_>) = runtime.block_on(async {
            let mut pairs = Vec::new();
            for n in 0..watchers {
                let (guard, inbox) = rooms.register(user(n)).await;
                rooms.join(guard.id(), "bench").await.ok();
                pairs.push((guard, inbox));
            }
            pairs.into_iter().unzip()
        });
        let (mover, _mover_inbox) = runtime.block_on(rooms.register(user(watchers)));
        let mover_id = mover.id();
        let manager = &rooms;

        group.bench_with_input(
            BenchmarkId::new("join_leave", watchers),
            &watchers,
            |b, _| {
                b.to_async(&runtime).iter(|| async move {
                    manager.join(mover_id, "bench").await.ok();
                    manager.leave(mover_id, "bench").await.ok();
                });
                // Keep queues from filling up between samples
                for inbox in inboxes.iter_mut() {
                    while inbox.try_recv().is_ok() {}
                }
            },
        );

        runtime.block_on(async {
            mover.close().await;
            for guard in guards {
                guard.close().await;
            }
        });
    }

    group.finish();
}

criterion_group!(benches, bench_presence_tally, bench_join_leave);
criterion_main!(benches);
