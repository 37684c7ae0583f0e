//! Minimal terminal walk-through of the client: log in, filter, sort, page.
//!
//! Run against a local API:
//!
//! ```text
//! cargo run --example event_browser -- organizer@example.com secret
//! ```

use std::time::Duration;

use evently_client::{ClientConfig, EventsClient, FileTokenStore, SortKey};

#[tokio::main]
async fn main() -> evently_client::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evently_client=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let email = args.next().unwrap_or_else(|| "organizer@example.com".into());
    let password = args.next().unwrap_or_else(|| "secret".into());

    let store = FileTokenStore::new(std::env::temp_dir().join("evently-session.json"));
    let client =
        EventsClient::with_store(ClientConfig::default(), std::sync::Arc::new(store)).await?;

    if !client.session().is_authenticated().await {
        client.login(&email, &password).await?;
    }

    let view = client.event_list_view();
    view.set_filter_input("conf").await;
    // Wait out the debounce so the filter settles and the fetch runs.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    view.toggle_sort(SortKey::StartDate).await;
    let snapshot = view.snapshot().await;
    println!(
        "{} events match {:?} (page {} of size {})",
        snapshot.total, snapshot.filter, snapshot.page_index, snapshot.page_size
    );
    for event in &snapshot.rows {
        println!(
            "  #{} {} @ {} ({})",
            event.id,
            event.name,
            event.location,
            event.start_date.format("%Y-%m-%d")
        );
    }

    Ok(())
}
