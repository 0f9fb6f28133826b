//! `relayboard` binary: loads configuration, runs migrations, wires every
//! adapter and service, and serves the HTTP API (spec §6).

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use relayboard_application::use_cases::handler_registry::HandlerRegistry;
use relayboard_application::use_cases::sync_egress::BoardTargets;
use relayboard_application::{
    BoardSyncHandler, BulkImportHandler, ConflictService, DirectoryGroupSyncHandler, DocumentQueueService,
    EmbeddingGenerationHandler, HybridSearchService, JiraRefreshHandler, JobQueueService, SyncEgressService,
    SyncIngressService, TagSynonymService,
};
use relayboard_application::use_cases::sync_ingress::BoardKind;
use relayboard_domain::entities::JobType;
use relayboard_domain::ports::EmbeddingService;
use relayboard_infrastructure::adapters::{
    FsStorageAdapter, HmacWebhookVerifier, HttpEmbeddingService, PlainTextExtractor, ReqwestBoardClient,
    ReqwestDirectoryClient, ReqwestJiraClient,
};
use relayboard_infrastructure::config::AppConfig;
use relayboard_infrastructure::repositories::{
    PgAutoResolutionRuleRepository, PgConflictRepository, PgContactRepository, PgDocumentRepository,
    PgDocumentTaskRepository, PgJobRepository, PgOrganizationRepository, PgProjectRepository, PgSearchIndex,
    PgTagRepository,
};
use relayboard_infrastructure::{database, logging};
use relayboard_server::transport::axum_http::AppState;

#[derive(Parser, Debug)]
#[command(name = "relayboard")]
#[command(about = "Durable job coordination, document processing, board sync, and hybrid search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run pending database migrations, then exit.
    Migrate,
    /// Run pending migrations and serve the HTTP API (spec §6).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let json_logs = std::env::var("RELAYBOARD_ENV").as_deref() == Ok("production");
    logging::init_logging(json_logs);

    let pool = database::connect(&config.database).await?;
    database::migrate(&pool).await?;

    match cli.command {
        Command::Migrate => {
            info!("migrations applied");
        }
        Command::Serve => serve(config, pool).await?,
    }

    Ok(())
}

async fn serve(config: AppConfig, pool: sqlx::PgPool) -> anyhow::Result<()> {
    let jobs_repo = Arc::new(PgJobRepository::new(pool.clone()));
    let document_tasks_repo = Arc::new(PgDocumentTaskRepository::new(pool.clone()));
    let documents_repo: Arc<PgDocumentRepository> = Arc::new(PgDocumentRepository::new(pool.clone()));
    let contacts_repo: Arc<PgContactRepository> = Arc::new(PgContactRepository::new(pool.clone()));
    let organizations_repo: Arc<PgOrganizationRepository> = Arc::new(PgOrganizationRepository::new(pool.clone()));
    let conflicts_repo: Arc<PgConflictRepository> = Arc::new(PgConflictRepository::new(pool.clone()));
    let rules_repo: Arc<PgAutoResolutionRuleRepository> = Arc::new(PgAutoResolutionRuleRepository::new(pool.clone()));
    let tags_repo = Arc::new(PgTagRepository::new(pool.clone()));
    let search_index = Arc::new(PgSearchIndex::new(pool.clone()));
    let projects_repo: Arc<PgProjectRepository> = Arc::new(PgProjectRepository::new(pool.clone()));

    let board_client: Arc<dyn relayboard_domain::ports::BoardClient> = Arc::new(ReqwestBoardClient::new(
        config.board.api_base_url.clone(),
        config.board.api_token.clone(),
        config.board.max_retries,
    ));
    let webhook_verifier: Arc<dyn relayboard_domain::ports::WebhookVerifier> =
        Arc::new(HmacWebhookVerifier::new(config.board.webhook_secret.clone()));
    let storage: Arc<dyn relayboard_domain::ports::StorageAdapter> =
        Arc::new(FsStorageAdapter::new(config.storage.root_dir.clone()));
    let extractor: Arc<dyn relayboard_domain::ports::TextExtractor> = Arc::new(PlainTextExtractor);
    let embeddings: Arc<dyn EmbeddingService> = Arc::new(HttpEmbeddingService::new(
        config.embeddings.api_base_url.clone(),
        config.embeddings.api_key.clone(),
        config.embeddings.model.clone(),
    ));

    let board_targets = BoardTargets {
        contacts_board: config.board.contacts_board_id.clone(),
        organizations_board: config.board.organizations_board_id.clone(),
    };

    let egress = Arc::new(SyncEgressService::new(
        board_client.clone(),
        contacts_repo.clone(),
        organizations_repo.clone(),
        board_targets.clone(),
    ));
    let conflict_service = Arc::new(ConflictService::new(
        conflicts_repo.clone(),
        rules_repo.clone(),
        contacts_repo.clone(),
        organizations_repo.clone(),
        egress.clone(),
    ));
    let ingress = Arc::new(SyncIngressService::new(
        contacts_repo.clone(),
        organizations_repo.clone(),
        conflicts_repo.clone(),
        conflict_service.clone(),
    ));
    let tags = Arc::new(TagSynonymService::new(tags_repo.clone()));

    let embeddings_for_query = embeddings.clone();
    let embed_query: Arc<
        dyn Fn(&str) -> std::pin::Pin<Box<dyn std::future::Future<Output = relayboard_domain::error::Result<Option<Vec<f32>>>> + Send>>
            + Send
            + Sync,
    > = Arc::new(move |query: &str| {
        let embeddings = embeddings_for_query.clone();
        let query = query.to_owned();
        Box::pin(async move { embeddings.embed(&query).await })
    });
    let search = Arc::new(HybridSearchService::new(search_index, tags.clone(), embed_query));

    let documents = Arc::new(DocumentQueueService::new(
        document_tasks_repo,
        documents_repo.clone(),
        storage,
        extractor,
        embeddings.clone(),
    ));

    let mut handler_registry = HandlerRegistry::new();
    handler_registry.register(
        JobType::BoardSyncContacts,
        Arc::new(BoardSyncHandler::new(
            board_client.clone(),
            ingress.clone(),
            config.board.contacts_board_id.clone().unwrap_or_default(),
            BoardKind::Contacts,
        )),
    );
    handler_registry.register(
        JobType::BoardSyncOrganizations,
        Arc::new(BoardSyncHandler::new(
            board_client.clone(),
            ingress.clone(),
            config.board.organizations_board_id.clone().unwrap_or_default(),
            BoardKind::Organizations,
        )),
    );
    handler_registry.register(
        JobType::EmbeddingGeneration,
        Arc::new(EmbeddingGenerationHandler::new(documents_repo.clone(), embeddings.clone())),
    );
    handler_registry.register(JobType::BulkImport, Arc::new(BulkImportHandler::new(projects_repo.clone())));

    if let Some(jira_config) = &config.jira {
        let jira_client: Arc<dyn relayboard_domain::ports::JiraClient> = Arc::new(ReqwestJiraClient::new(
            jira_config.base_url.clone(),
            jira_config.user_email.clone(),
            jira_config.api_token.clone(),
        ));
        handler_registry.register(
            JobType::JiraRefresh,
            Arc::new(JiraRefreshHandler::new(jira_client, projects_repo.clone())),
        );
    } else {
        info!("board.jira not configured; jira-refresh jobs will fail with \"no handler registered\"");
    }

    if let Some(directory_config) = &config.directory {
        let directory_client: Arc<dyn relayboard_domain::ports::DirectoryClient> = Arc::new(ReqwestDirectoryClient::new(
            directory_config.base_url.clone(),
            directory_config.api_token.clone(),
        ));
        handler_registry.register(JobType::DirectoryGroupSync, Arc::new(DirectoryGroupSyncHandler::new(directory_client)));
    } else {
        info!("directory integration not configured; directory-group-sync jobs will fail with \"no handler registered\"");
    }

    let handlers = Arc::new(handler_registry);
    let jobs = Arc::new(JobQueueService::new(jobs_repo, handlers.clone()));

    let state = Arc::new(AppState {
        jobs,
        documents,
        egress,
        ingress,
        conflicts: conflict_service,
        tags,
        search,
        webhook_verifier,
        conflict_repo: conflicts_repo,
        rule_repo: rules_repo,
        handlers,
        board_targets,
        cron_token: config.server.cron_token.clone(),
    });

    let router = relayboard_server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(address = %config.server.bind_address, "relayboard listening");
    axum::serve(listener, router).await?;
    Ok(())
}
