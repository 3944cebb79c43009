use clap::Parser;
use probe_hash::Error;
use probe_hash::HashMap;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "entries", default_value_t = 12)]
    entries: usize,

    #[arg(short = 'r', long = "remove_every", default_value_t = 3)]
    remove_every: usize,
}

fn main() {
    let args = Args::parse();

    let mut map: HashMap<String, usize> = HashMap::new();
    for i in 0..args.entries {
        map.insert(format!("key_{i}"), i * i).unwrap();
    }
    println!(
        "inserted {} entries into {} slots",
        map.len(),
        map.capacity()
    );

    if args.remove_every > 0 {
        for i in (0..args.entries).step_by(args.remove_every) {
            map.remove(&format!("key_{i}")).unwrap();
        }
        println!(
            "removed every {}th key, {} live entries remain",
            args.remove_every,
            map.len()
        );
    }

    if let Some(key) = map.keys().next().cloned() {
        match map.insert(key.clone(), 0) {
            Err(Error::DuplicateKey) => println!("duplicate insert of {key} rejected"),
            Ok(()) => unreachable!("{key} was live"),
            Err(e) => println!("unexpected error: {e}"),
        }
    }

    println!("--- dump ---");
    print!("{map}");
}
