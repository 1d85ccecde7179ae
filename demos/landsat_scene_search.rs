use anyhow::Result;
use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;
use usgs::{Client, Coordinate, SceneSearch};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Example program that calls the library API.
    // Logs in with USGS_USERNAME / USGS_TOKEN unless a key is already stored.
    let client = Client::from_env()?;
    if client.store().load()?.is_none() {
        let username = std::env::var("USGS_USERNAME")?;
        let token = std::env::var("USGS_TOKEN")?;
        client.login(&username, &token, true)?;
    }

    let mut search = SceneSearch::new("landsat_ot_c2_l2");
    search.max_results = 5;
    search.center = Some(Coordinate::new(46.8523, -121.7603));
    search.distance = 5_000.0;
    search.start_date = NaiveDate::from_ymd_opt(2024, 7, 1);
    search.end_date = NaiveDate::from_ymd_opt(2024, 9, 30);

    let scenes = match client.scene_search(&search, None) {
        Err(e) if e.is_auth_expired() => {
            eprintln!("{e}");
            client.logout()?;
            return Ok(());
        }
        other => other?,
    };
    println!("{}", serde_json::to_string_pretty(&scenes.data)?);
    Ok(())
}
