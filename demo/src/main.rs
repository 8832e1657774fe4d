use std::process::exit;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub mod cli;

use buffer::driver::Observer;
use buffer::{Driver, Event, Item, RunConfig};
use cli::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RunConfig {
        consumers: args.consumers,
        producers: args.producers,
        capacity: args.capacity,
        items_per_producer: args.items,
    };
    let driver: Driver<char> = Driver::new(config)?;

    let seed: u64 = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    println!("Seed: {seed}");

    // No graceful stop exists here, a blocked acquire has no abort path.
    // Dump what the buffer held and leave.
    let watch = driver.buffer().clone();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, buffer was {}", render(&watch.snapshot()));
        exit(130);
    })?;

    // One deterministic character stream per producer, drawn up front so
    // every thread can read its slice without further rng state.
    let workloads: Vec<Vec<char>> = (0..args.producers)
        .map(|id| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(id as u64));
            (0..args.items).map(|_| rng.gen_range('A'..='Z')).collect()
        })
        .collect();

    let observer: Option<Observer<char>> = if args.quiet {
        None
    } else {
        Some(Box::new(|event| match event {
            Event::Produced {
                producer,
                item,
                contents,
            } => println!("Producer {producer} produced {item}: {}", render(&contents)),
            Event::Consumed {
                consumer,
                item,
                contents,
            } => println!("Consumer {consumer} consumed {item}: {}", render(&contents)),
            Event::SentinelInjected { producer } => {
                println!("Producer {producer} was last out, injected the poison pill");
            }
            Event::SentinelForwarded { consumer } => {
                println!("Consumer {consumer} passed the poison pill on");
            }
        }))
    };

    let report = driver.run(move |id, seq| workloads[id][seq], observer);

    for (id, items) in report.produced.iter().enumerate() {
        println!("Producer {id} produced {} characters", items.len());
    }
    for (id, items) in report.consumed.iter().enumerate() {
        println!(
            "Consumer {id} consumed {} characters: {}",
            items.len(),
            items.iter().collect::<String>()
        );
    }
    println!(
        "Done: {} produced, {} consumed",
        report.total_produced(),
        report.total_consumed()
    );

    Ok(())
}

fn render(contents: &[Item<char>]) -> String {
    let cells: Vec<String> = contents
        .iter()
        .map(|item| match item {
            Item::Data(c) => c.to_string(),
            Item::Sentinel => "<pill>".to_string(),
        })
        .collect();
    format!("[{}]", cells.join(", "))
}
