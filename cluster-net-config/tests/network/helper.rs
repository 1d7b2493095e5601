#[allow(unused_macros)]
macro_rules! get_network_config {
    () => {{
        // Get current function name
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let mut name = type_name_of(f);

        // Find and cut the rest of the path
        name = match &name[..name.len() - 3].rfind(':') {
            Some(pos) => &name[pos + 1..name.len() - 3],
            None => &name[..name.len() - 3],
        };
        let real_filename = format!("tests/network/resources/{name}.json");
        let input = std::fs::read_to_string(real_filename).expect("cannot find config file");

        cluster_net_config::network::NetworkConfiguration::from_json(&input)
            .expect("invalid network configuration")
    }};
}

#[allow(unused_imports)]
pub(crate) use get_network_config;
