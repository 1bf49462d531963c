use clap::Parser;
use monohash::HashSet;
use monohash::MonoAllocator;
use monohash::ValueReference;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "values", default_value_t = 1000)]
    values: usize,

    #[arg(short = 'm', long = "max_load_factor", default_value_t = 2.0)]
    max_load_factor: f32,

    /// Reserve buckets and recyclables before filling the table.
    #[arg(short = 'r', long = "reserve")]
    reserve: bool,

    /// List the size of every bucket.
    #[arg(short = 'b', long = "buckets")]
    buckets: bool,
}

fn main() {
    let args = Args::parse();

    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u64> =
        HashSet::with_load_factors_in(&allocator, 1.0, args.max_load_factor);

    if args.reserve {
        set.reserve_recyclables(args.values, ValueReference::Absolute);
        println!(
            "Reserved {} buckets and {} recyclables",
            set.bucket_count(),
            set.recyclables_count()
        );
    }

    println!("Filling set with {} u64 values...", args.values);
    set.extend(0..args.values as u64);

    print!("{}", set.distribution_report(args.buckets));
    println!("Arena bytes: {}", allocator.allocated_bytes());

    let erased = (0..args.values as u64)
        .step_by(2)
        .map(|value| set.erase(&value))
        .sum::<usize>();
    println!(
        "Erased {} values, {} nodes ready for reuse",
        erased,
        set.recyclables_count()
    );

    let before = allocator.allocated_bytes();
    set.extend((0..args.values as u64).step_by(2));
    println!(
        "Reinserted them, arena grew by {} bytes",
        allocator.allocated_bytes() - before
    );
}
