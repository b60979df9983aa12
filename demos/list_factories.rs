use pairwatch::registry::FactoryRegistry;

fn main() {
    let registry = FactoryRegistry::builtin();
    for chain in registry.supported_chains() {
        println!("{} ({chain})", registry.chain_name(chain).unwrap());
        for factory in registry.factories(chain) {
            println!("  {:<12} {} [{}]", factory.name, factory.address, factory.variant);
        }
    }
}
