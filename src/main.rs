use anyhow::{Context, Result};
use chexnet::cli::{parse_args, setup_logging, Commands, StatsArgs, TrainArgs};
use chexnet::config::TrainConfig;
use chexnet::data::{AugmentedImageSequence, Augmenter, SequenceConfig};
use chexnet::model::checkpoint::{weights_file, TrainingStats};
use chexnet::model::ModelFactory;
use chexnet::training::callbacks::{
    ModelCheckpointCallback, MultiClassAurocCallback, ProgressLoggerCallback, TimerCallback,
};
use chexnet::training::{RunPlan, Trainer, TrainerConfig};
use chexnet::utils::{
    backup_config_file, copy_dataset_csvs, ensure_dir, format_duration, RunLock, SPLITS,
};
use chexnet::TrainBackend;
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", chexnet::info());

    let result = match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Stats(args) => run_stats(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &std::path::Path) -> Result<TrainConfig> {
    TrainConfig::from_file(path).with_context(|| format!("Failed to load config {:?}", path))
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let output_dir = config.output_directory.clone();

    ensure_dir(&output_dir)?;
    let _lock = RunLock::acquire(&output_dir).context("Output directory is busy")?;
    backup_config_file(&output_dir, &args.config).context("Failed to back up config file")?;
    copy_dataset_csvs(&config.dataset_csv_dir, &output_dir, SPLITS)
        .context("Failed to copy dataset CSVs")?;

    let stats = if config.use_trained_model_weights {
        let stats = TrainingStats::load_or_default(&output_dir)?;
        if let Some(best) = stats.best_mean_auroc {
            info!("Resuming with best mean AUROC {:.4}", best);
        }
        stats
    } else {
        TrainingStats::default()
    };

    let plan = RunPlan::from_config(&config, &output_dir)?;
    plan.log();

    let device = Default::default();
    let weights_path = config.model_weights_file();
    if let Some(path) = &weights_path {
        info!("** load model from: {:?} **", weights_file(path));
    }

    let model = ModelFactory::new(&config.base_model_weights_dir)
        .get_model::<TrainBackend>(
            &config.class_names,
            &config.base_model_name,
            config.input_shape(),
            config.use_base_model_weights,
            weights_path.as_deref(),
            &device,
        )
        .context("Failed to build model")?;

    if config.show_model_summary {
        info!("\n{}", model.summary(config.input_shape()));
    }

    let (height, width, _) = config.input_shape();
    info!("** create image generators **");
    let mut train_sequence = AugmentedImageSequence::new(
        SequenceConfig::new(
            output_dir.join("train.csv"),
            &config.class_names,
            &config.image_source_directory,
            config.batch_size,
            (height, width),
        )
        .with_augmenter(Augmenter::default())
        .with_steps(plan.train_steps)
        .with_shuffle(true)
        .with_seed(config.seed)
        .with_workers(config.generator_workers),
    )?;
    let mut validation_sequence = AugmentedImageSequence::new(
        SequenceConfig::new(
            output_dir.join("validation.csv"),
            &config.class_names,
            &config.image_source_directory,
            config.batch_size,
            (height, width),
        )
        .with_steps(plan.validation_steps)
        .with_workers(config.generator_workers),
    )?;

    if args.dry_run {
        info!(
            "Dry run: {} train batches and {} validation batches ready",
            train_sequence.len(),
            validation_sequence.len()
        );
        return Ok(());
    }

    let trainer_config = TrainerConfig {
        epochs: config.epochs,
        initial_learning_rate: config.initial_learning_rate,
        min_learning_rate: config.min_learning_rate,
        patience_reduce_lr: config.patience_reduce_lr,
        lr_reduce_factor: config.lr_reduce_factor,
        show_progress: true,
    };

    let mut trainer = Trainer::<TrainBackend>::new(trainer_config, device)
        .with_callback(ModelCheckpointCallback::new(
            output_dir.join(&config.output_weights_name),
        ))
        .with_callback(MultiClassAurocCallback::new(
            &config.class_names,
            &output_dir,
            &config.best_weights_name(),
            stats,
        ))
        .with_callback(ProgressLoggerCallback::new(1))
        .with_callback(TimerCallback::new());

    info!("** start training **");
    let loss = plan.class_weights.to_loss();
    let (_, mut result) = trainer
        .fit(model, &mut train_sequence, &mut validation_sequence, &loss)
        .context("Training failed")?;

    result.best_mean_auroc = TrainingStats::load_or_default(&output_dir)?.best_mean_auroc;
    let best = weights_file(&output_dir.join(config.best_weights_name()));
    if best.is_file() {
        result.best_weights = Some(best);
    }

    info!("=== Training Results ===");
    info!("Total epochs: {}", result.state.epoch);
    if let Some(auroc) = result.best_mean_auroc {
        info!("Best mean AUROC: {:.4}", auroc);
    }
    info!("Training time: {}", format_duration(result.duration_secs));
    if let Some(ref weights) = result.best_weights {
        info!("Best weights saved to: {:?}", weights);
    }

    Ok(())
}

fn run_stats(args: StatsArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let plan = RunPlan::from_config(&config, &config.dataset_csv_dir)
        .with_context(|| format!("Failed to read splits from {:?}", config.dataset_csv_dir))?;

    info!("Classes: {}", config.class_names.join(", "));
    for (class, positive) in &plan.train_counts.positive {
        info!(
            "  {:<20} train {:>6}/{:<6} validation {:>6}/{}",
            class,
            positive,
            plan.train_counts.total,
            plan.validation_counts.positive_for(class).unwrap_or(0),
            plan.validation_counts.total
        );
    }
    plan.log();
    Ok(())
}
