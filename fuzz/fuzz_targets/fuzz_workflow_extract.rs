#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Parsing must fail cleanly on garbage
        let _ = actperm_crawl::workflows::permissions_from_source(source);

        if let Ok(document) = serde_yaml::from_str::<serde_yaml::Value>(source) {
            // Matches must serialize back to YAML
            for found in actperm_crawl::extract::search(&document, "permissions") {
                let _ = serde_yaml::to_string(&found);
            }
        }
    }
});
