use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;

use hutledger::access::Role;
use hutledger::address::Address;
use hutledger::catalog::{FileCatalog, RecipientCatalog};
use hutledger::config::Config;
use hutledger::custody::{simulate_aggregator_deposit, SharedToken, TokenCustody};
use hutledger::ledger::{self, Journal, LedgerEngine};
use hutledger::logging::{log, obj, ts_epoch_secs, v_amount, v_str, Domain, Level};
use hutledger::planner::{plan_distribution, prepare_batch};
use hutledger::replica::ReplicaHub;
use hutledger::storage::StateStore;

const DEMO_HOLDER: u64 = 0x100;
const DEMO_AGGREGATOR: u64 = 0x200;
const DEMO_HUT_A: u64 = 0xa1;
const DEMO_HUT_B: u64 = 0xb1;

fn print_usage() {
    println!("hutledger - pooled payout ledger for mountain huts\n");
    println!("Commands:");
    println!("  demo                          - Run deposit, batch allocation and withdraw through the ledger");
    println!("  plan <pool>                   - Plan a distribution from the catalog file");
    println!("  recover                       - Rebuild allocations from the journal");
    println!("  replica status                - Show the demo mirror");
    println!("  replica deposit <amount>      - Deposit into the demo mirror");
    println!("  replica allocate <id=amount>..  - Batch credit the demo mirror");
    println!("  replica withdraw <id>         - Pay out one hut in the demo mirror");
    println!("  replica withdraw-fee          - Pay out the fee allocation");
    println!("  replica reset                 - Reset the demo mirror");
    println!("\nEnvironment: FEE_NUMERATOR FEE_DENOMINATOR JOURNAL_PATH REPLICA_DB_PATH REPLICA_KEY");
    println!("             CATALOG_PATH ACTOR_CAPACITY REPLICA_CHANNEL_CAPACITY ADMIN_ADDRESS LOG_DIR");
}

fn parse_amount(raw: &str) -> Result<u128> {
    raw.parse().with_context(|| format!("invalid amount: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cfg = Config::from_env();
    let admin = cfg.admin_address.unwrap_or_else(|| Address::from_low_u64(1));
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("command", v_str(&args[1])), ("admin", v_str(&admin.to_string()))]),
    );

    match args[1].as_str() {
        "demo" => run_demo(&cfg, admin).await,
        "plan" => {
            let pool = args.get(2).ok_or_else(|| anyhow!("usage: plan <pool>"))?;
            run_plan(&cfg, admin, parse_amount(pool)?).await
        }
        "recover" => run_recover(&cfg),
        "replica" => run_replica(&cfg, admin, &args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn run_demo(cfg: &Config, admin: Address) -> Result<()> {
    let holder = Address::from_low_u64(DEMO_HOLDER);
    let hut_a = Address::from_low_u64(DEMO_HUT_A);
    let hut_b = Address::from_low_u64(DEMO_HUT_B);

    let token = SharedToken::new();
    {
        let mut t = token.lock();
        t.mint(admin, 10_000)?;
        t.approve(admin, holder, 10_000);
        // Card payments land in custody without going through deposit().
        simulate_aggregator_deposit(&mut t, Address::from_low_u64(DEMO_AGGREGATOR), holder, 500)?;
    }

    let engine = LedgerEngine::new(admin, holder, token.clone(), cfg.fee_config(admin)?);
    let journal = Journal::open(&cfg.journal_path)
        .with_context(|| format!("opening journal {}", cfg.journal_path))?;
    let (handle, task) = ledger::spawn(engine, cfg.actor_capacity, Some(journal));

    handle.deposit(admin, 10_000).await??;
    let receipt = handle.batch_allocate(admin, vec![hut_a, hut_b], vec![5_000, 3_000]).await??;
    let paid = handle.withdraw(hut_a).await??;
    if !handle.has_role(Role::Operator, admin).await? {
        bail!("admin lost OPERATOR during demo");
    }
    let status = handle.status().await??;
    log(
        Level::Info,
        Domain::System,
        "demo_complete",
        obj(&[
            ("fee", v_amount(receipt.fee)),
            ("paid", v_amount(paid)),
            ("hut_balance", v_amount(token.balance_of(hut_a))),
            ("state_hash", v_str(&handle.state_hash().await?)),
        ]),
    );

    drop(handle);
    let engine = task.await.context("ledger task panicked")?;
    engine.check_invariants()?;

    let mut store = StateStore::new(&cfg.replica_db_path)?;
    store.init()?;
    store.persist_status(ts_epoch_secs(), &status)?;

    println!("{}", status.to_json());
    Ok(())
}

async fn run_plan(cfg: &Config, admin: Address, pool: u128) -> Result<()> {
    let catalog = FileCatalog::new(&cfg.catalog_path);
    let records = catalog.recipients().await?;
    let fee = cfg.fee_config(admin)?;
    let plan = plan_distribution(&records, pool, &fee)?;
    let batch = prepare_batch(&plan, &fee, pool)?;
    let out = json!({
        "summary": plan.summary(),
        "plan": plan,
        "batch": batch,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_recover(cfg: &Config) -> Result<()> {
    let recovered = Journal::recover(&cfg.journal_path)
        .with_context(|| format!("recovering journal {}", cfg.journal_path))?;
    let allocations: serde_json::Map<String, serde_json::Value> = recovered
        .allocations
        .iter()
        .map(|(account, amount)| (account.to_string(), v_amount(*amount)))
        .collect();
    let out = json!({
        "last_seq": recovered.last_seq,
        "total_allocated": v_amount(recovered.total_allocated),
        "deposited": v_amount(recovered.deposited),
        "claimed": v_amount(recovered.claimed),
        "allocations": allocations,
        "fee_config": recovered.fee_config,
        "skipped_lines": recovered.skipped_lines,
        "hash": recovered.hash(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_replica(cfg: &Config, admin: Address, args: &[String]) -> Result<()> {
    let hub = ReplicaHub::new(&cfg.replica_db_path, &cfg.replica_key, cfg.replica_channel_capacity)?;
    let mut viewer = hub.viewer("cli")?;
    let action = args.first().map(|s| s.as_str()).unwrap_or("status");
    match action {
        "status" => {}
        "deposit" => {
            let amount = args.get(1).ok_or_else(|| anyhow!("usage: replica deposit <amount>"))?;
            viewer.deposit(parse_amount(amount)?)?;
        }
        "allocate" => {
            let mut distribution = Vec::new();
            for pair in &args[1..] {
                let (id, amount) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected <id>=<amount>, got {}", pair))?;
                let id: u32 = id.parse().with_context(|| format!("invalid hut id: {}", id))?;
                distribution.push((id, parse_amount(amount)?));
            }
            viewer.allocate(&distribution, &cfg.fee_config(admin)?)?;
        }
        "withdraw" => {
            let id = args.get(1).ok_or_else(|| anyhow!("usage: replica withdraw <id>"))?;
            let id: u32 = id.parse().with_context(|| format!("invalid hut id: {}", id))?;
            viewer.withdraw_recipient(id)?;
        }
        "withdraw-fee" => {
            viewer.withdraw_fee()?;
        }
        "reset" => viewer.reset()?,
        other => bail!("unknown replica action: {}", other),
    }
    println!("{}", serde_json::to_string_pretty(viewer.snapshot())?);
    Ok(())
}
