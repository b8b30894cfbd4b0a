//! Counter shell for the Kade POS terminal.
//!
//! Reads one command per line from stdin. `online` / `offline` stand in for
//! the OS connectivity notifications.

use std::collections::HashMap;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};

use kade_core::ProductId;
use kade_sales::{Cart, MenuItem, Receipt, sort_for_display};
use kade_terminal::checkout::MenuSource;
use kade_terminal::{AppState, CheckoutError, SyncOutcome, SyncTrigger, TerminalConfig};

const HELP: &str = "\
commands:
  menu                 show the menu
  add <id>             add one of a menu item
  qty <id> <n>         set quantity (0 removes)
  remove <id>          remove a line
  cart                 show the cart
  checkout             place or queue the order
  receipt <file>       save the last receipt as HTML
  online | offline     report a connectivity change
  queue                list orders waiting to sync
  sync                 sync the queue now
  discard-queue        drop every queued order
  status               show connectivity and backlog
  quit";

struct Session {
    app: AppState,
    menu: HashMap<ProductId, MenuItem>,
    cart: Cart,
    last_receipt: Option<Receipt>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kade_observability::init();

    let config = TerminalConfig::from_env().context("invalid configuration")?;
    let app = AppState::open(&config).await?;
    let worker = app.spawn_sync_worker();

    let mut notices = app.notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            let prefix = if notice.is_warning() { "!" } else { "*" };
            println!("{prefix} {}", notice.message());
        }
    });

    let mut session = Session {
        app,
        menu: HashMap::new(),
        cart: Cart::new(),
        last_receipt: None,
    };
    if let Err(err) = session.reload_menu().await {
        eprintln!("menu unavailable: {err:#}");
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if matches!(words.first(), Some(&"quit") | Some(&"exit")) {
            break;
        }
        if let Err(err) = session.run(&words).await {
            eprintln!("error: {err:#}");
        }
    }

    worker.shutdown().await;
    Ok(())
}

impl Session {
    async fn reload_menu(&mut self) -> anyhow::Result<()> {
        let loaded = self.app.load_menu().await?;
        if let MenuSource::Cached { cached_at } = loaded.source {
            println!("showing menu cached at {cached_at}");
        }
        self.menu = loaded.items.into_iter().map(|item| (item.id, item)).collect();
        Ok(())
    }

    fn menu_item(&self, raw: Option<&&str>) -> anyhow::Result<&MenuItem> {
        let id: ProductId = raw.context("missing item id")?.parse()?;
        self.menu
            .get(&id)
            .with_context(|| format!("no menu item {id}"))
    }

    async fn run(&mut self, words: &[&str]) -> anyhow::Result<()> {
        match words {
            [] => {}
            ["help"] => println!("{HELP}"),
            ["menu"] => {
                self.reload_menu().await?;
                let mut items: Vec<MenuItem> = self.menu.values().cloned().collect();
                sort_for_display(&mut items);
                for item in &items {
                    let flag = if item.is_available { "" } else { " (sold out)" };
                    println!("{:>4}  {:<20} {:>8}  {}{flag}", item.id, item.name, item.price, item.category.as_str());
                }
            }
            ["add", rest @ ..] => {
                let item = self.menu_item(rest.first())?.clone();
                self.cart.add(&item)?;
                self.print_cart()?;
            }
            ["qty", id, n] => {
                let id: ProductId = id.parse()?;
                let n: u32 = n.parse().context("quantity must be a whole number")?;
                self.cart.set_quantity(id, n)?;
                self.print_cart()?;
            }
            ["remove", id] => {
                self.cart.remove(id.parse()?);
                self.print_cart()?;
            }
            ["cart"] => self.print_cart()?,
            ["checkout"] => self.checkout().await?,
            ["receipt", path] => {
                let receipt = self.last_receipt.as_ref().context("no receipt yet")?;
                tokio::fs::write(path, receipt.render_html(&self.app.shop)?)
                    .await
                    .with_context(|| format!("failed to write {path}"))?;
                println!("receipt saved to {path}");
            }
            ["online"] => {
                self.app.connectivity.set_online();
            }
            ["offline"] => {
                self.app.connectivity.set_offline();
            }
            ["queue"] => {
                let queued = self.app.queue.list().await;
                if queued.is_empty() {
                    println!("queue is empty");
                }
                for order in queued {
                    println!("{}  {:>8}  {} line(s)", order.queued_at, order.total_amount, order.items.len());
                }
            }
            ["sync"] => match self.app.sync.drain(SyncTrigger::Manual).await {
                SyncOutcome::Skipped { reason } => println!("sync skipped: {reason:?}"),
                SyncOutcome::Completed(report) => {
                    println!("synced {}, {} remaining", report.synced_count(), report.remaining);
                    if let Some(failure) = report.stopped_on {
                        println!("stopped at {}: {}", failure.queued_at, failure.error);
                    }
                }
            },
            ["discard-queue"] => {
                let dropped = self.app.queue.clear().await?;
                println!("discarded {dropped} queued order(s)");
            }
            ["status"] => match self.app.status().label() {
                Some(label) => println!("{label}"),
                None => println!("Online"),
            },
            _ => bail!("unknown command; try `help`"),
        }
        Ok(())
    }

    fn print_cart(&self) -> anyhow::Result<()> {
        if self.cart.is_empty() {
            println!("cart is empty");
            return Ok(());
        }
        for line in self.cart.lines() {
            println!("{:>3} x {:<20} {:>8}", line.quantity, line.name, line.amount()?);
        }
        println!("total {}", self.cart.total()?);
        Ok(())
    }

    async fn checkout(&mut self) -> anyhow::Result<()> {
        match self.app.checkout.checkout(&mut self.cart).await {
            Ok(done) => {
                println!("{}", done.receipt.render_text(&self.app.shop)?);
                self.last_receipt = Some(done.receipt);
                Ok(())
            }
            Err(CheckoutError::NotPersisted { receipt, source, .. }) => {
                println!("{}", receipt.render_text(&self.app.shop)?);
                self.last_receipt = Some(*receipt);
                Err(source).context("order queued but not saved to disk")
            }
            Err(err) => Err(err.into()),
        }
    }
}
