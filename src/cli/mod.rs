#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr as _;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};

use crate::action::{self, ActionResponse};
use crate::assignment::lifecycle::StepInput;
use crate::assignment::model::{
    self, Assignment, AssignmentStatus, PhotoSlot, TaskKind, VEHICLE_PHOTO_COUNT,
};
use crate::assignment::steps::{self, Step};
use crate::assignment::store::AssignmentStore;
use crate::config::{self, Config};
use crate::driver::{Driver, DriverDirectory};
use crate::enrich::{self, OpenCageResolver};
use crate::media::MediaStore;
use crate::output::table::Table;

#[derive(Debug, Parser)]
#[command(name = "fleetops", version, about = "Fleet assignment back-office")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Assignment(AssignmentArgs),
    Driver(DriverArgs),
    Step(StepArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct AssignmentArgs {
    #[command(subcommand)]
    pub cmd: AssignmentCmd,
}

#[derive(Debug, Subcommand)]
pub enum AssignmentCmd {
    Add(AssignmentAddArgs),
    List(AssignmentListArgs),
    Show(AssignmentShowArgs),
}

#[derive(Debug, Parser)]
pub struct AssignmentAddArgs {
    /// Driver the vehicle is assigned to
    #[arg(short = 'd', long = "driver")]
    pub driver: Option<String>,
    /// Vehicle plate
    #[arg(short = 'p', long = "plate")]
    pub plate: Option<String>,
    /// Scheduled pickup date (YYYY-MM-DD)
    #[arg(long = "date")]
    pub date: Option<String>,
    /// Explicit assignment ID (generated when omitted)
    #[arg(long = "id")]
    pub id: Option<String>,
    /// Create assignments in bulk from a YAML file
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,
}

#[derive(Debug, Parser)]
pub struct AssignmentListArgs {
    /// Filter by status (assigned, pending, picked, completed)
    #[arg(long = "filter", default_value = "")]
    pub filter: String,
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct AssignmentShowArgs {
    pub id: String,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct DriverArgs {
    #[command(subcommand)]
    pub cmd: DriverCmd,
}

#[derive(Debug, Subcommand)]
pub enum DriverCmd {
    Add(DriverAddArgs),
    List(DriverListArgs),
}

#[derive(Debug, Parser)]
pub struct DriverAddArgs {
    /// Driver name
    pub name: String,
    #[arg(long = "phone")]
    pub phone: Option<String>,
    /// Explicit driver ID (generated when omitted)
    #[arg(long = "id")]
    pub id: Option<String>,
}

#[derive(Debug, Parser)]
pub struct DriverListArgs {
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct StepArgs {
    #[command(subcommand)]
    pub cmd: StepCmd,
}

#[derive(Debug, Subcommand)]
pub enum StepCmd {
    /// Show which capture step applies to an assignment
    Show(StepShowArgs),
    /// Submit task details (ASSIGNED -> PENDING)
    Start(StepStartArgs),
    /// Submit the five vehicle photos (PENDING -> PICKED)
    Pickup(StepPickupArgs),
    /// Submit the final handover photo (PICKED -> COMPLETED)
    Complete(StepCompleteArgs),
}

#[derive(Debug, Parser)]
pub struct StepShowArgs {
    pub id: String,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StepStartArgs {
    pub id: String,
    /// Driver submitting the step
    #[arg(short = 'd', long = "driver")]
    pub driver: String,
    /// Task type: pickup or dropoff
    #[arg(short = 't', long = "task")]
    pub task: String,
    /// Transport mode, required for pickup tasks
    #[arg(long = "transport")]
    pub transport: Option<String>,
    /// Explicit start address (skips geocoding)
    #[arg(long = "address")]
    pub address: Option<String>,
    /// Device latitude for address enrichment
    #[arg(long = "lat")]
    pub lat: Option<f64>,
    /// Device longitude for address enrichment
    #[arg(long = "lon")]
    pub lon: Option<f64>,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StepPickupArgs {
    pub id: String,
    #[arg(short = 'd', long = "driver")]
    pub driver: String,
    /// Front view photo
    #[arg(long = "front")]
    pub front: PathBuf,
    /// Left view photo
    #[arg(long = "left")]
    pub left: PathBuf,
    /// Back view photo
    #[arg(long = "back")]
    pub back: PathBuf,
    /// Right view photo
    #[arg(long = "right")]
    pub right: PathBuf,
    /// Odometer photo
    #[arg(long = "odometer")]
    pub odometer: PathBuf,
    /// Explicit pickup address (skips geocoding)
    #[arg(long = "address")]
    pub address: Option<String>,
    #[arg(long = "lat")]
    pub lat: Option<f64>,
    #[arg(long = "lon")]
    pub lon: Option<f64>,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StepCompleteArgs {
    pub id: String,
    #[arg(short = 'd', long = "driver")]
    pub driver: String,
    /// Final handover photo
    #[arg(long = "photo")]
    pub photo: PathBuf,
    /// Explicit drop-off address (skips geocoding)
    #[arg(long = "address")]
    pub address: Option<String>,
    #[arg(long = "lat")]
    pub lat: Option<f64>,
    #[arg(long = "lon")]
    pub lon: Option<f64>,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Commands::Completion(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "fleetops", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(args) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Set(set) => {
                config::set_value_string(&set.key, &set.value)?;
                println!("Set {} = {}", set.key, set.value);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => {
                let val = config::get_value_string(&get.key)?;
                match val {
                    Some(v) => {
                        println!("{v}");
                        Ok(ExitCode::SUCCESS)
                    }
                    None => anyhow::bail!(
                        "configuration key '{}' not found - use 'fleetops config list' to see available keys",
                        get.key
                    ),
                }
            }
        },
        Commands::Assignment(args) => cmd_assignment(args).await,
        Commands::Driver(args) => cmd_driver(args).await,
        Commands::Step(args) => cmd_step(args).await,
        Commands::Version => Ok(cmd_version()),
    }
}

async fn load_cfg() -> anyhow::Result<Config> {
    let cfg = tokio::task::spawn_blocking(|| -> anyhow::Result<Config> {
        let (cfg, _paths) = config::load()?;
        Ok(cfg)
    })
    .await??;
    Ok(cfg)
}

fn assignment_store(cfg: &Config) -> anyhow::Result<AssignmentStore> {
    Ok(AssignmentStore::new(cfg.assignments_dir()?))
}

fn driver_directory(cfg: &Config) -> anyhow::Result<DriverDirectory> {
    Ok(DriverDirectory::new(cfg.drivers_dir()?))
}

fn media_store(cfg: &Config) -> anyhow::Result<MediaStore> {
    Ok(MediaStore::new(cfg.media_dir()?, cfg.image_limits()))
}

async fn cmd_assignment(args: AssignmentArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let store = assignment_store(&cfg)?;
    let drivers = driver_directory(&cfg)?;

    match args.cmd {
        AssignmentCmd::Add(add) => cmd_assignment_add(&store, &drivers, add),
        AssignmentCmd::List(list) => cmd_assignment_list(&store, &list),
        AssignmentCmd::Show(show) => cmd_assignment_show(&store, &show),
    }
}

fn cmd_assignment_add(
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    args: AssignmentAddArgs,
) -> anyhow::Result<ExitCode> {
    if let Some(file) = &args.file {
        if args.driver.is_some() || args.plate.is_some() || args.date.is_some() {
            anyhow::bail!("cannot combine --file with --driver/--plate/--date");
        }
        let created = assignments_from_file(store, drivers, file)?;
        for a in &created {
            println!("Created assignment {} ({} on {})", a.id, a.car_plate, a.pickup_date);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(driver), Some(plate), Some(date)) = (&args.driver, &args.plate, &args.date) else {
        anyhow::bail!("--driver, --plate and --date are required (or use --file)");
    };

    let a = create_assignment(store, drivers, args.id.clone(), driver, plate, date)?;
    println!("Created assignment {} ({} on {})", a.id, a.car_plate, a.pickup_date);
    Ok(ExitCode::SUCCESS)
}

fn create_assignment(
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    id: Option<String>,
    driver_id: &str,
    plate: &str,
    date: &str,
) -> anyhow::Result<Assignment> {
    if drivers.find_by_id(driver_id)?.is_none() {
        anyhow::bail!("driver '{driver_id}' not found");
    }
    let plate = model::normalize_car_plate(plate).map_err(anyhow::Error::msg)?;
    let date = model::validate_pickup_date(date).map_err(anyhow::Error::msg)?;

    let id = id.unwrap_or_else(Assignment::new_id);
    if store.find_by_id(&id)?.is_some() {
        anyhow::bail!("assignment '{id}' already exists");
    }

    let a = Assignment::new(id, driver_id.to_owned(), plate, date);
    store.save(&a)?;
    Ok(a)
}

#[derive(Debug, serde::Deserialize)]
struct AssignmentFile {
    version: String,
    assignments: Vec<AssignmentFileEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct AssignmentFileEntry {
    #[serde(default)]
    id: String,
    driver: String,
    car_plate: String,
    pickup_date: String,
}

fn assignments_from_file(
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    file: &str,
) -> anyhow::Result<Vec<Assignment>> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read assignment file: {file}"))?;
    let def: AssignmentFile =
        serde_yaml::from_str(&data).with_context(|| format!("failed to parse YAML: {file}"))?;

    if def.version.trim() != "1.0" {
        anyhow::bail!(
            "unsupported assignment file version: {} (expected 1.0)",
            def.version
        );
    }

    let mut created = Vec::new();
    for entry in def.assignments {
        let id = if entry.id.trim().is_empty() {
            None
        } else {
            Some(entry.id.clone())
        };
        let a = create_assignment(
            store,
            drivers,
            id,
            entry.driver.trim(),
            &entry.car_plate,
            &entry.pickup_date,
        )?;
        created.push(a);
    }
    Ok(created)
}

fn cmd_assignment_list(
    store: &AssignmentStore,
    args: &AssignmentListArgs,
) -> anyhow::Result<ExitCode> {
    let mut records = store.list()?;
    if !args.filter.trim().is_empty() {
        let wanted = parse_status_filter(&args.filter)?;
        records.retain(|r| r.status == wanted);
    }

    if args.json {
        let mut s = serde_json::to_string_pretty(&records)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    let mut t = Table::new(["id", "driver", "plate", "pickup_date", "status", "task"]);
    for r in &records {
        t.row([
            r.id.clone(),
            r.driver_id.clone(),
            r.car_plate.clone(),
            r.pickup_date.clone(),
            r.status.to_string(),
            r.task.map_or_else(String::new, |k| k.to_string()),
        ]);
    }
    if args.csv {
        t.write_csv()?;
    } else {
        t.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_status_filter(input: &str) -> anyhow::Result<AssignmentStatus> {
    match input.trim().to_lowercase().as_str() {
        "assigned" => Ok(AssignmentStatus::Assigned),
        "pending" => Ok(AssignmentStatus::Pending),
        "picked" => Ok(AssignmentStatus::Picked),
        "completed" => Ok(AssignmentStatus::Completed),
        other => anyhow::bail!(
            "unknown status filter '{other}' (expected assigned|pending|picked|completed)"
        ),
    }
}

fn cmd_assignment_show(
    store: &AssignmentStore,
    args: &AssignmentShowArgs,
) -> anyhow::Result<ExitCode> {
    let res = action::get_assignment(store, &args.id);
    if args.json {
        return print_response(&res);
    }
    let Some(a) = &res.data else {
        eprintln!("{}", res.message);
        return Ok(ExitCode::from(1));
    };
    print_assignment(a);
    Ok(ExitCode::SUCCESS)
}

fn print_assignment(a: &Assignment) {
    println!("id:           {}", a.id);
    println!("driver:       {}", a.driver_id);
    println!("plate:        {}", a.car_plate);
    println!("pickup date:  {}", a.pickup_date);
    println!("status:       {}", a.status);
    if let Some(task) = a.task {
        match &a.transport_type {
            Some(t) => println!("task:         {task} ({t})"),
            None => println!("task:         {task}"),
        }
    }
    if let Some(addr) = &a.start_address {
        println!("start:        {addr}");
    }
    if let Some(addr) = &a.pickup_address {
        println!("pickup:       {addr}");
    }
    if let Some(addr) = &a.drop_off_address {
        println!("drop-off:     {addr}");
    }
    if !a.images.is_empty() {
        println!("photos:       {}", a.images.join(", "));
    }
    if let Some(img) = &a.final_image {
        println!("final photo:  {img}");
    }
    let step = steps::step_for(a.status);
    println!("next step:    {} - {}", step.title(), step.describe());
}

async fn cmd_driver(args: DriverArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let drivers = driver_directory(&cfg)?;

    match args.cmd {
        DriverCmd::Add(add) => {
            let id = add.id.unwrap_or_else(Driver::new_id);
            if drivers.find_by_id(&id)?.is_some() {
                anyhow::bail!("driver '{id}' already exists");
            }
            let name = add.name.trim().to_owned();
            if name.len() < 2 {
                anyhow::bail!("driver name must be at least 2 characters");
            }
            let d = Driver::new(id, name, add.phone);
            drivers.save(&d)?;
            println!("Created driver {} ({})", d.id, d.name);
            Ok(ExitCode::SUCCESS)
        }
        DriverCmd::List(list) => {
            let all = drivers.list()?;
            if list.json {
                let mut s = serde_json::to_string_pretty(&all)?;
                s.push('\n');
                print!("{s}");
                return Ok(ExitCode::SUCCESS);
            }
            let mut t = Table::new(["id", "name", "phone", "created_at"]);
            for d in &all {
                t.row([
                    d.id.clone(),
                    d.name.clone(),
                    d.phone.clone().unwrap_or_default(),
                    d.created_at.clone(),
                ]);
            }
            if list.csv {
                t.write_csv()?;
            } else {
                t.print()?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_step(args: StepArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let store = assignment_store(&cfg)?;
    let drivers = driver_directory(&cfg)?;

    match args.cmd {
        StepCmd::Show(show) => cmd_step_show(&store, &show),
        StepCmd::Start(start) => cmd_step_start(&cfg, &store, &drivers, start),
        StepCmd::Pickup(pickup) => cmd_step_pickup(&cfg, &store, &drivers, pickup).await,
        StepCmd::Complete(complete) => cmd_step_complete(&cfg, &store, &drivers, complete),
    }
}

fn cmd_step_show(store: &AssignmentStore, args: &StepShowArgs) -> anyhow::Result<ExitCode> {
    let res = action::get_assignment(store, &args.id);
    let Some(a) = &res.data else {
        eprintln!("{}", res.message);
        return Ok(ExitCode::from(1));
    };

    let step = steps::step_for(a.status);
    if args.json {
        let out = serde_json::json!({
            "id": a.id,
            "status": a.status,
            "step": step.title(),
            "description": step.describe(),
        });
        let mut s = serde_json::to_string_pretty(&out)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Assignment {} is {}", a.id, a.status);
    if step == Step::Done {
        println!("{}", step.describe());
    } else {
        println!("Current step: {}", step.title());
        println!("  {}", step.describe());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_step_start(
    cfg: &Config,
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    args: StepStartArgs,
) -> anyhow::Result<ExitCode> {
    let task = TaskKind::from_str(&args.task).map_err(anyhow::Error::msg)?;
    let start_address = resolve_address_arg(cfg, args.address, args.lat, args.lon);

    let res = action::update_assignment(
        store,
        drivers,
        &args.id,
        &args.driver,
        StepInput::Start {
            task,
            transport_type: args.transport,
            start_address,
        },
    );
    report(&res, args.json)
}

async fn cmd_step_pickup(
    cfg: &Config,
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    args: StepPickupArgs,
) -> anyhow::Result<ExitCode> {
    let media = media_store(cfg)?;
    let slots: [(PhotoSlot, PathBuf); VEHICLE_PHOTO_COUNT] = [
        (PhotoSlot::Front, args.front),
        (PhotoSlot::Left, args.left),
        (PhotoSlot::Back, args.back),
        (PhotoSlot::Right, args.right),
        (PhotoSlot::Odometer, args.odometer),
    ];

    // Store the photos and resolve the address concurrently; the engine only
    // sees their completed results at submission time.
    let mut handles = Vec::with_capacity(slots.len());
    for (slot, path) in slots {
        let media = media.clone();
        handles.push((
            slot,
            tokio::task::spawn_blocking(move || media.store_file(&path)),
        ));
    }
    let addr_cfg = cfg.clone();
    let (address, lat, lon) = (args.address, args.lat, args.lon);
    let addr_handle =
        tokio::task::spawn_blocking(move || resolve_address_arg(&addr_cfg, address, lat, lon));

    let mut images = Vec::with_capacity(VEHICLE_PHOTO_COUNT);
    for (slot, handle) in handles {
        let reference = handle
            .await
            .context("photo task join error")?
            .with_context(|| format!("{} photo", slot.label()))?;
        images.push(reference);
    }
    let pickup_address = addr_handle.await.context("address task join error")?;

    let res = action::update_assignment(
        store,
        drivers,
        &args.id,
        &args.driver,
        StepInput::Pickup {
            images,
            pickup_address,
        },
    );
    report(&res, args.json)
}

fn cmd_step_complete(
    cfg: &Config,
    store: &AssignmentStore,
    drivers: &DriverDirectory,
    args: StepCompleteArgs,
) -> anyhow::Result<ExitCode> {
    let media = media_store(cfg)?;
    let final_image = media.store_file(&args.photo).context("final photo")?;
    let drop_off_address = resolve_address_arg(cfg, args.address, args.lat, args.lon);

    let res = action::update_assignment(
        store,
        drivers,
        &args.id,
        &args.driver,
        StepInput::Complete {
            final_image,
            drop_off_address,
        },
    );
    report(&res, args.json)
}

/// Explicit address wins; otherwise try reverse geocoding. Either way a
/// missing address never blocks the step.
fn resolve_address_arg(
    cfg: &Config,
    explicit: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Option<String> {
    if explicit.is_some() {
        return explicit;
    }
    let resolver = OpenCageResolver::from_config(&cfg.geocoder);
    let coords = match (lat, lon) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };
    enrich::resolve_best_effort(resolver.as_ref(), coords)
}

fn report(res: &ActionResponse, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        return print_response(res);
    }
    if res.is_success() {
        if let Some(a) = &res.data {
            println!("Assignment {} is now {}", a.id, a.status);
            let step = steps::step_for(a.status);
            if step == Step::Done {
                println!("All steps complete.");
            } else {
                println!("Next step: {}", step.title());
            }
        }
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("error ({}): {}", res.status, res.message);
        Ok(ExitCode::from(1))
    }
}

fn print_response(res: &ActionResponse) -> anyhow::Result<ExitCode> {
    let mut s = serde_json::to_string_pretty(res)?;
    s.push('\n');
    print!("{s}");
    Ok(if res.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_version() -> ExitCode {
    println!("fleetops version {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("FLEETOPS_GIT_COMMIT") {
        println!("  commit: {commit}");
    }
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}
