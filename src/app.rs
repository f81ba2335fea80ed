//! Headless demo loop wiring the controllers together.
//!
//! Stands in for the page: a toggleable view over the creature list and
//! the optimistic item list, a polled clock line, and stdin commands in
//! place of buttons. All state lives in the cache; this loop only reads
//! snapshots and invokes controller operations.

use std::time::Duration;

use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cache::{QueryCache, QueryKey, QueryOptions, QueryStatus};
use crate::clock::{ClockClient, ClockReading};
use crate::config::Config;
use crate::dex::{CreatureSummary, DexClient, DexQueries};
use crate::error::QueryError;
use crate::items::{ItemList, ItemStore};
use crate::query::{InfiniteQuery, MutationController, Poller};

const MY_ITEMS_TAG: &str = "my-items";
const CLOCK_TAG: &str = "clock";

/// Which list the main view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
  AllCreatures,
  MyItems,
}

pub struct App {
  cache: QueryCache,
  creatures: InfiniteQuery<CreatureSummary>,
  dex: DexQueries,
  store: ItemStore,
  add_item: MutationController<ItemList, String>,
  clock_key: QueryKey,
  view: View,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let cache = QueryCache::new();

    let client = DexClient::new(&config.api.base_url, config.api.page_size)?;
    let dex = DexQueries::new(
      cache.clone(),
      client,
      Duration::from_millis(config.api.list_stale_time_ms),
      Duration::from_millis(config.api.detail_stale_time_ms),
    );
    let creatures = dex.creatures();

    let mut store_builder = ItemStore::builder()
      .latency(Duration::from_millis(config.store.latency_ms))
      .failure_probability(config.store.failure_probability);
    if let Some(seed) = config.store.seed {
      store_builder = store_builder.seed(seed);
    }
    let store = store_builder.build();

    let items_key = QueryKey::new(MY_ITEMS_TAG);
    let write_store = store.clone();
    let refetch_store = store.clone();
    let add_item = MutationController::new(
      cache.clone(),
      items_key,
      move |text: String| {
        let store = write_store.clone();
        async move { store.append(&text).await }
      },
      move || {
        let store = refetch_store.clone();
        async move { Ok(store.list().await) }
      },
      |old: Option<ItemList>, text: &String| {
        let mut list = old.unwrap_or_default();
        list.items.push(text.clone());
        list.ts = chrono::Utc::now().timestamp_millis();
        list
      },
    );

    Ok(Self {
      cache,
      creatures,
      dex,
      store,
      add_item,
      clock_key: QueryKey::new(CLOCK_TAG),
      view: View::AllCreatures,
    })
  }

  pub async fn run(&mut self, config: &Config) -> Result<()> {
    let _clock = self.start_clock(config);
    let mut clock_rx = self.cache.subscribe(&self.clock_key);

    println!("dexq — creature catalog demo");
    println!("commands: more | detail <n> | add <text> | toggle | refresh | quit");

    if let Err(e) = self.creatures.fetch_initial().await {
      println!("! failed to load creatures: {e}");
    }
    self.render().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      tokio::select! {
        changed = clock_rx.changed() => {
          if changed.is_err() {
            break;
          }
          let entry = clock_rx.borrow_and_update().clone();
          if let Ok(Some(reading)) = entry.data_as::<ClockReading>() {
            tracing::debug!(unixtime = reading.unixtime, "clock updated");
            println!("[{}] {}", reading.timezone, reading.datetime);
          }
        }
        line = lines.next_line() => {
          let line = match line? {
            Some(l) => l,
            None => break,
          };
          if !self.handle_command(line.trim()).await {
            break;
          }
        }
      }
    }

    info!("shutting down");
    Ok(())
  }

  /// Returns false when the app should quit.
  async fn handle_command(&mut self, line: &str) -> bool {
    match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest)) {
      ("quit", _) | ("q", _) => return false,
      ("toggle", _) => {
        self.view = match self.view {
          View::AllCreatures => View::MyItems,
          View::MyItems => View::AllCreatures,
        };
      }
      ("more", _) => {
        if self.view != View::AllCreatures {
          println!("(load more only applies to the creature list)");
        } else {
          match self.creatures.fetch_more().await {
            Ok(true) => {}
            Ok(false) => println!("(nothing more to load)"),
            Err(e) => println!("! load more failed: {e}"),
          }
        }
      }
      ("detail", n) => match n.parse::<usize>() {
        Ok(n) => self.show_detail(n).await,
        Err(_) => println!("usage: detail <index>"),
      },
      ("add", text) if !text.is_empty() => {
        // Optimistic: the item shows up in the list immediately and is
        // rolled back if the store rejects it.
        if let Err(QueryError::WriteFailed { message, input }) =
          self.add_item.mutate(text.to_string()).await
        {
          println!("! {message}: {input:?} was removed from the list again");
        }
      }
      ("add", _) => println!("usage: add <text>"),
      ("refresh", _) => {}
      ("", _) => {}
      (other, _) => println!("unknown command: {other}"),
    }
    self.render().await;
    true
  }

  async fn show_detail(&self, index: usize) {
    let creature = self
      .creatures
      .pages()
      .into_iter()
      .flat_map(|p| p.results)
      .nth(index);
    match creature {
      Some(c) => match self.dex.creature_detail(&c.detail_url).await {
        Ok(detail) => {
          println!("  {} — sprite: {}", detail.name, detail.sprite_url.as_deref().unwrap_or("none"));
        }
        Err(e) => println!("! detail fetch failed: {e}"),
      },
      None => println!("no creature at index {index}"),
    }
  }

  async fn render(&self) {
    match self.view {
      View::AllCreatures => self.render_creatures(),
      View::MyItems => self.render_items().await,
    }
  }

  fn render_creatures(&self) {
    let state = self.creatures.state();
    match state.status {
      QueryStatus::Loading => println!("loading creatures..."),
      QueryStatus::Error => {
        if let Some(e) = &state.error {
          println!("! {e}");
        }
      }
      _ => {
        let mut index = 0;
        for page in self.creatures.pages() {
          for creature in page.results {
            println!("{index:3}  {}", creature.name);
            index += 1;
          }
        }
        if self.creatures.can_fetch_more() {
          println!("     (more available — type `more`)");
        } else {
          println!("     (nothing more to load)");
        }
        if state.is_fetching() {
          println!("     background updating...");
        }
      }
    }
  }

  async fn render_items(&self) {
    let key = QueryKey::new(MY_ITEMS_TAG);
    let store = self.store.clone();
    let list = self
      .cache
      .fetch::<ItemList, _, _>(&key, &QueryOptions::new(), move || async move {
        Ok(store.list().await)
      })
      .await;
    match list {
      Ok(list) => {
        println!("your items (updated at {} ms):", list.ts);
        for item in &list.items {
          println!("  - {item}");
        }
        if self.cache.get(&key).is_fetching() {
          println!("  updating in background...");
        }
      }
      Err(e) => println!("! failed to load items: {e}"),
    }
  }

  fn start_clock(&self, config: &Config) -> Poller {
    let clock = ClockClient::new(&config.clock.base_url);
    let timezone = config.clock.timezone.clone();
    let initial = serde_json::to_value(ClockReading::initial(&timezone))
      .unwrap_or(serde_json::Value::Null);
    Poller::start(
      self.cache.clone(),
      self.clock_key.clone(),
      QueryOptions::new().with_initial_data(initial),
      Duration::from_millis(config.clock.poll_interval_ms),
      move || {
        let clock = clock.clone();
        let timezone = timezone.clone();
        async move { clock.now(&timezone).await }
      },
    )
  }
}
