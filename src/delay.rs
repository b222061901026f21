use std::time::Duration;
use std::thread;
use rand::Rng;
use log::info;

/// Pause between profile visits. Randomized so the visit cadence does not
/// look like a fixed-interval bot.
pub fn random_profile_delay() {
    let mut rng = rand::thread_rng();
    let delay_secs = rng.gen_range(3..=9);
    info!("Waiting {} seconds before next profile...", delay_secs);
    thread::sleep(Duration::from_secs(delay_secs));
}

/// Shorter pause between in-page interactions (search, modal clicks).
pub fn random_action_delay() {
    let mut rng = rand::thread_rng();
    let delay_ms = rng.gen_range(800..=2_000);
    thread::sleep(Duration::from_millis(delay_ms));
}
