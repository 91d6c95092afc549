use std::sync::Arc;

use indexmap::IndexMap;
use tracing::Instrument;
use uuid::Uuid;

use super::cleaner::TextCleaner;
use super::confidence::{derive_flags, error_flag, NO_SOURCES_FLAG, PARSE_FAILED_FLAG};
use super::fetcher::BoundedFetcher;
use crate::db::QueryRecorder;
use crate::llm::ModelDispatcher;
use crate::tools::search::SearchBackend;
use crate::types::{AnalyzeResponse, ParsedDocument, QueryStatus, Result, SourceInfo};
use crate::utils::toml_config::PipelineConfig;
use crate::utils::truncate_chars;

const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Single-pass analysis: search, fetch, clean, dispatch, flag.
///
/// [`run`](Self::run) never fails. Early exits (no sources, nothing parsed)
/// and unexpected errors all come back as an [`AnalyzeResponse`] carrying a
/// confidence flag.
pub struct QueryPipeline {
    search: Arc<dyn SearchBackend>,
    fetcher: BoundedFetcher,
    cleaner: TextCleaner,
    dispatcher: ModelDispatcher,
    recorder: Arc<dyn QueryRecorder>,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        fetcher: BoundedFetcher,
        dispatcher: ModelDispatcher,
        recorder: Arc<dyn QueryRecorder>,
        config: PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            search,
            fetcher,
            cleaner: TextCleaner::new()?,
            dispatcher,
            recorder,
            config,
        })
    }

    pub fn search_backend(&self) -> &str {
        self.search.name()
    }

    /// Whether backend calls are answered with placeholders
    pub fn is_simulated(&self) -> bool {
        self.dispatcher.is_simulated()
    }

    pub async fn run(&self, query: &str) -> AnalyzeResponse {
        let query_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("query", query_id = %query_id);

        async {
            tracing::info!(query = %query, "Starting analysis");

            let (response, status) = match self.run_stages(&query_id, query).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Analysis failed");
                    (
                        AnalyzeResponse {
                            query_id: query_id.clone(),
                            sources: Vec::new(),
                            model_analyses: IndexMap::new(),
                            confidence_flags: vec![error_flag(&e.to_string())],
                        },
                        QueryStatus::Failed,
                    )
                }
            };

            if let Err(e) = self.recorder.set_query_status(&query_id, status).await {
                tracing::warn!(error = %e, "Failed to record query status");
            }
            tracing::info!(status = status.as_str(), "Analysis finished");
            response
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        query_id: &str,
        query: &str,
    ) -> Result<(AnalyzeResponse, QueryStatus)> {
        self.recorder.create_query(query_id, query).await?;

        let sources = self.search.search(query).await?;
        self.recorder.save_sources(query_id, &sources).await?;
        tracing::info!(count = sources.len(), backend = self.search.name(), "Sources found");

        if sources.is_empty() {
            return Ok((
                self.early_exit(query_id, Vec::new(), NO_SOURCES_FLAG),
                QueryStatus::NoSources,
            ));
        }

        let urls: Vec<String> = sources.iter().map(|s| s.url.clone()).collect();
        let parsed = self.fetcher.fetch_all(&urls).await;

        if parsed.is_empty() {
            let infos = sources
                .iter()
                .map(|s| SourceInfo {
                    url: s.url.clone(),
                    title: s.title.clone(),
                })
                .collect();
            return Ok((
                self.early_exit(query_id, infos, PARSE_FAILED_FLAG),
                QueryStatus::ParseFailed,
            ));
        }

        let documents = self.cleaner.clean_documents(parsed);
        self.recorder.save_documents(query_id, &documents).await?;

        let context = self.assemble_context(&documents);
        let prompt = self.dispatcher.build_prompt(&context);
        let model_analyses = self.dispatcher.dispatch(query_id, &prompt).await;
        let confidence_flags = derive_flags(&model_analyses);

        Ok((
            AnalyzeResponse {
                query_id: query_id.to_string(),
                sources: documents
                    .iter()
                    .map(|d| SourceInfo {
                        url: d.url.clone(),
                        title: d.title.clone(),
                    })
                    .collect(),
                model_analyses,
                confidence_flags,
            },
            QueryStatus::Completed,
        ))
    }

    fn early_exit(&self, query_id: &str, sources: Vec<SourceInfo>, flag: &str) -> AnalyzeResponse {
        tracing::warn!(flag = %flag, "Analysis stopped early");
        AnalyzeResponse {
            query_id: query_id.to_string(),
            sources,
            model_analyses: IndexMap::new(),
            confidence_flags: vec![flag.to_string()],
        }
    }

    /// `[title](url)` header plus bounded text per document
    pub fn assemble_context(&self, documents: &[ParsedDocument]) -> String {
        documents
            .iter()
            .map(|doc| {
                format!(
                    "[{}]({})\n{}",
                    doc.title,
                    doc.url,
                    truncate_chars(&doc.cleaned_text, self.config.max_document_chars)
                )
            })
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR)
    }
}
