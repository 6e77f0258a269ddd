use std::fs::File;
use std::io::BufWriter;
use std::time::SystemTime;

use memory_stats::memory_stats;
use tracing_flame::FlameLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use skizo::{Arena, Domain, DomainOptions, StringTable};

fn setup_global_subscriber() -> impl Drop {
	let file = File::create("./trace.folded").unwrap();
	let flame_layer = FlameLayer::new(BufWriter::new(file)).with_file_and_line(false);
	let guard = flame_layer.flush_on_drop();

	let subscriber = Registry::default()
		.with(flame_layer);

	tracing::subscriber::set_global_default(subscriber).expect("Could not set global default");
	guard
}

fn main() {
	let _guard = setup_global_subscriber();

	let mut start = SystemTime::now();
	let arena = Arena::new();
	let strings = StringTable::new(&arena);
	let domain = Domain::create(&arena, &strings, DomainOptions::default()).expect("no domain exists on this thread yet");

	println! {
		"Domain creation time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1000000.0,
	}

	start = SystemTime::now();

	for i in 0..10_000 {
		let class = skizo::Class::shell(strings.intern_identifier(&format!("Demo{i}")), skizo::types::class::SpecialClass::None);
		domain.types().register_class(arena.alloc(class, skizo::AllocationKind::Class)).unwrap();
	}

	println! {
		"Class registration time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1000000.0,
	}

	println!("Registered classes: {}", domain.types().all_classes().len());

	domain.gc().collect(&[]);
	println!("GC stats after an explicit collection: {:?}", domain.gc().stats().last());

	domain.close();
}
