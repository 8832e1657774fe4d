use std::sync::Arc;
use std::thread;

use anyhow::ensure;
use crossbeam_channel::unbounded;

use crate::bounded::BoundedBuffer;
use crate::shutdown::{Item, ProducerId, ShutdownCoordinator};

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_ITEMS_PER_PRODUCER: usize = 30;

/// Concurrency topology of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub consumers: usize,
    pub producers: usize,
    pub capacity: usize,
    pub items_per_producer: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            consumers: 2,
            producers: 3,
            capacity: DEFAULT_CAPACITY,
            items_per_producer: DEFAULT_ITEMS_PER_PRODUCER,
        }
    }
}

/// Diagnostic event emitted after a buffer operation completed.
///
/// `contents` is a post-operation [`BoundedBuffer::snapshot`]: stale by the
/// time the observer sees it, useful only for tracing.
#[derive(Debug, Clone)]
pub enum Event<T> {
    Produced {
        producer: ProducerId,
        item: T,
        contents: Vec<Item<T>>,
    },
    Consumed {
        consumer: usize,
        item: T,
        contents: Vec<Item<T>>,
    },
    SentinelInjected {
        producer: ProducerId,
    },
    SentinelForwarded {
        consumer: usize,
    },
}

/// Hook receiving an [`Event`] after every add/remove. Called outside all
/// semaphore holds; must stay cheap so it does not distort the interleaving
/// it is observing.
pub type Observer<T> = Box<dyn Fn(Event<T>) + Send + Sync>;

/// What every execution unit produced and consumed, indexed by unit id.
#[derive(Debug)]
pub struct Report<T> {
    pub produced: Vec<Vec<T>>,
    pub consumed: Vec<Vec<T>>,
}

impl<T> Report<T> {
    pub fn total_produced(&self) -> usize {
        self.produced.iter().map(Vec::len).sum()
    }

    pub fn total_consumed(&self) -> usize {
        self.consumed.iter().map(Vec::len).sum()
    }
}

/// Owns the shared buffer and coordinator and runs the whole topology:
/// spawns every producer and consumer, waits for all of them, and reports
/// what passed through.
pub struct Driver<T> {
    config: RunConfig,
    buffer: Arc<BoundedBuffer<Item<T>>>,
    coordinator: ShutdownCoordinator,
}

impl<T: Clone + Send> Driver<T> {
    /// Validates the topology and registers every producer with the
    /// coordinator. Registration completes here, before any thread exists,
    /// so no finisher can ever observe a not-yet-populated active set.
    pub fn new(config: RunConfig) -> anyhow::Result<Self> {
        ensure!(config.consumers > 0, "need at least one consumer");
        ensure!(config.producers > 0, "need at least one producer");
        let buffer = Arc::new(BoundedBuffer::new(config.capacity)?);
        let coordinator = ShutdownCoordinator::new();
        for id in 0..config.producers {
            coordinator.register(id);
        }
        Ok(Self {
            config,
            buffer,
            coordinator,
        })
    }

    /// Shared handle on the buffer, e.g. for out-of-band diagnostics.
    pub fn buffer(&self) -> &Arc<BoundedBuffer<Item<T>>> {
        &self.buffer
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs all producers and consumers to completion.
    ///
    /// `generator(id, seq)` supplies the `seq`-th item of producer `id`.
    /// Returns once every producer has finished and every consumer has
    /// observed the sentinel.
    pub fn run<G>(self, generator: G, observer: Option<Observer<T>>) -> Report<T>
    where
        G: Fn(ProducerId, usize) -> T + Send + Sync,
    {
        let RunConfig {
            consumers,
            producers,
            items_per_producer,
            ..
        } = self.config;

        let (produced_tx, produced_rx) = unbounded();
        let (consumed_tx, consumed_rx) = unbounded();

        let buffer = &*self.buffer;
        let coordinator = &self.coordinator;
        let generator = &generator;
        let observer = observer.as_deref();

        thread::scope(|s| {
            for id in 0..producers {
                let tx = produced_tx.clone();
                s.spawn(move || {
                    let items =
                        produce(buffer, coordinator, id, items_per_producer, generator, observer);
                    tx.send((id, items)).expect("driver stopped listening");
                });
            }
            for id in 0..consumers {
                let tx = consumed_tx.clone();
                s.spawn(move || {
                    let items = consume(buffer, id, observer);
                    tx.send((id, items)).expect("driver stopped listening");
                });
            }
        });

        let mut report = Report {
            produced: vec![Vec::new(); producers],
            consumed: vec![Vec::new(); consumers],
        };
        for _ in 0..producers {
            let (id, items) = produced_rx.recv().expect("missing producer report");
            report.produced[id] = items;
        }
        for _ in 0..consumers {
            let (id, items) = consumed_rx.recv().expect("missing consumer report");
            report.consumed[id] = items;
        }
        report
    }
}

fn produce<T, G>(
    buffer: &BoundedBuffer<Item<T>>,
    coordinator: &ShutdownCoordinator,
    id: ProducerId,
    count: usize,
    generator: &G,
    observer: Option<&(dyn Fn(Event<T>) + Send + Sync)>,
) -> Vec<T>
where
    T: Clone,
    G: Fn(ProducerId, usize) -> T,
{
    let mut items = Vec::with_capacity(count);
    for seq in 0..count {
        let item = generator(id, seq);
        buffer.add(Item::Data(item.clone()));
        if let Some(observer) = observer {
            observer(Event::Produced {
                producer: id,
                item: item.clone(),
                contents: buffer.snapshot(),
            });
        }
        items.push(item);
    }

    if coordinator.finish(id) {
        // Last producer out signals the consumers.
        buffer.add(Item::Sentinel);
        if let Some(observer) = observer {
            observer(Event::SentinelInjected { producer: id });
        }
    }
    items
}

fn consume<T: Clone>(
    buffer: &BoundedBuffer<Item<T>>,
    id: usize,
    observer: Option<&(dyn Fn(Event<T>) + Send + Sync)>,
) -> Vec<T> {
    let mut items = Vec::new();
    loop {
        match buffer.remove() {
            Item::Data(item) => {
                if let Some(observer) = observer {
                    observer(Event::Consumed {
                        consumer: id,
                        item: item.clone(),
                        contents: buffer.snapshot(),
                    });
                }
                items.push(item);
            }
            Item::Sentinel => {
                // Put the pill back so the remaining consumers see it too.
                buffer.add(Item::Sentinel);
                if let Some(observer) = observer {
                    observer(Event::SentinelForwarded { consumer: id });
                }
                return items;
            }
        }
    }
}
