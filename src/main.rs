use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
mod handlers;
mod pipeline;
mod services;
mod utils;

use config::Config;
use events::LaunchIntent;
use handlers::{create_handler, HandlerContext};
use pipeline::{HandlerOutcome, HandlerRegistry, PipelineEngine, UrlRecord};
use services::compatibility::Compatibility;
use services::{create_ui_source, AutomationService, CompatibilityResolver, IncognitoCompanion};

#[derive(Parser, Debug)]
#[command(name = "url-relay")]
#[command(about = "Пропускает ссылку через цепочку обработчиков и открывает её в целевом приложении")]
struct Args {
    /// Текст со ссылкой
    text: String,

    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "url-relay.toml")]
    config: String,

    /// Пакет приложения, в котором открыть ссылку
    #[arg(short, long)]
    target: Option<String>,

    /// Номер ссылки, если в тексте их несколько
    #[arg(long, default_value_t = 0)]
    pick: usize,

    /// Открыть в приватном режиме (если переключатель доступен)
    #[arg(long, conflicts_with = "no_incognito")]
    incognito: bool,

    /// Открыть в обычном режиме (если переключатель доступен)
    #[arg(long)]
    no_incognito: bool,

    /// Показать скрытую группу обработчиков
    #[arg(long)]
    expand: bool,

    /// Режим сухого запуска (события UI эмулируются)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Инициализация системы логирования
    init_tracing(&args.log_level)?;

    info!("Запуск url-relay v{}", env!("CARGO_PKG_VERSION"));

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - события UI эмулируются");
    }

    let links = utils::extract_links(&args.text)?;
    if links.len() > 1 {
        info!("Найдено ссылок: {}, выбрана #{}", links.len(), args.pick);
    }
    let url = utils::pick_link(&links, args.pick)?;

    // Сервис автоматизации и приватный режим
    let service = Arc::new(AutomationService::new(Handle::current(), config.automation_timeout()));
    service.connect();

    let resolver = Arc::new(CompatibilityResolver::with_builtin());
    let companion = Arc::new(IncognitoCompanion::new(resolver, config.incognito.mode));
    companion.init_from(&LaunchIntent::view(url.as_str()));
    if args.incognito || args.no_incognito {
        let state = companion.request(args.incognito);
        info!("Инкогнито: {}", if state { "включено" } else { "выключено" });
    }
    if let Some(target) = args.target.as_deref() {
        let preview = LaunchIntent::view(url.as_str()).with_package(target);
        if companion.will_need_help(config.as_ref(), &preview) == Compatibility::NeedsHelp {
            info!("Для {} понадобится автоматический ввод URL", target);
        }
    }

    let ctx = HandlerContext {
        config: config.clone(),
        companion,
        service: service.clone(),
        target_app: args.target.clone(),
    };
    let registry = HandlerRegistry::from_ids(
        &config.pipeline.handlers,
        config.pipeline.deferred.as_deref(),
        |id, display| create_handler(id, display, &ctx),
    );

    let engine = PipelineEngine::new(registry)
        .with_max_iterations(config.pipeline.max_iterations)
        .with_cap_hook(|record| {
            warn!("Цепочка обработчиков не сошлась, остановлено на {}", record.url());
        });

    if args.expand {
        engine.registry().display_state().set_group_visible(true);
    }

    let report = engine.on_new_url(UrlRecord::new(url))?;
    info!(
        "Итоговый URL: {} (проходов: {}, замен: {})",
        report.record.url(),
        report.passes,
        report.rewrites
    );
    if report.capped {
        warn!("Часть изменений отклонена из-за лимита в {} итераций", config.pipeline.max_iterations);
    }
    for failure in &report.failures {
        if let HandlerOutcome::Failed { handler, phase, reason } = failure {
            warn!("Обработчик '{}' завершился с ошибкой в {}: {}", handler, phase, reason);
        }
    }

    if !service.is_armed() {
        service.disconnect();
        info!("url-relay завершил работу");
        return Ok(());
    }

    // Ввод URL через автоматизацию: ждём события UI целевого приложения
    let source = create_ui_source(config.clone(), args.target.clone(), args.dry_run)?;
    let source_service = service.clone();
    let source_handle = tokio::spawn(async move {
        if let Err(e) = source.run(source_service).await {
            error!("Ошибка в источнике UI событий: {}", e);
        }
    });

    if let Some(session) = service.session() {
        let snapshot = session.snapshot();
        info!(
            "Ожидание ввода URL в {} (не дольше {:?})",
            snapshot.target_app.as_deref().unwrap_or("?"),
            snapshot
                .deadline
                .map(|deadline| deadline.saturating_duration_since(tokio::time::Instant::now()))
                .unwrap_or(service.timeout())
        );
    }

    tokio::select! {
        _ = service.wait_idle() => {
            info!("Сессия автоматизации завершена");
        }
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        },
    }

    info!("Завершение работы...");

    service.disconnect();
    source_handle.abort();

    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, source_handle).await {
        Ok(_) => info!("Источник UI событий остановлен"),
        Err(_) => warn!("Таймаут при остановке источника UI событий"),
    }

    info!("url-relay завершил работу");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
