use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plant_doctor::{
    render, ClientConfig, HttpDiagnosisApi, Notification, Notifier, SubmitOutcome,
    UploadController, Variant,
};

/// Diagnose a plant disease from a leaf photo.
#[derive(Parser, Debug)]
#[command(name = "plant-doctor", version, about)]
struct Args {
    /// PNG or JPEG photo of the affected plant
    image: PathBuf,

    /// Diagnosis service root (overrides PLANT_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Per-request timeout in seconds (overrides PLANT_API_TIMEOUT_SECS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,

    /// Print the merged result as JSON instead of the text panel
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // stdout carries the result, everything else goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.api_url {
        config = config.with_base_url(url)?;
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    tracing::info!(api = %config.base_url, "using diagnosis service");

    let api = HttpDiagnosisApi::new(&config)?;
    let (notifier, mut toasts) = Notifier::channel();
    let toast_printer = tokio::spawn(async move {
        while let Some(toast) = toasts.recv().await {
            print_toast(&toast);
        }
    });

    let controller = UploadController::new(api, notifier);
    if controller.select_path(&args.image).await.is_err() {
        drop(controller);
        toast_printer.await?;
        return Ok(ExitCode::FAILURE);
    }

    let outcome = {
        let submit = controller.on_submit();
        tokio::pin!(submit);
        tokio::select! {
            outcome = &mut submit => outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling submission");
                controller.shutdown();
                submit.await
            }
        }
    };

    drop(controller);
    toast_printer.await?;

    let SubmitOutcome::Completed(result) = outcome else {
        return Ok(ExitCode::FAILURE);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let Some(panel) = render(Some(&result), &config)? {
        print!("{panel}");
    }
    Ok(ExitCode::SUCCESS)
}

fn print_toast(toast: &Notification) {
    let marker = match toast.variant {
        Variant::Success => "+",
        Variant::Default => "*",
        Variant::Destructive => "!",
    };
    eprintln!("[{marker}] {toast}");
}
