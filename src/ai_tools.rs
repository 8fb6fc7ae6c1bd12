use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::assembler::DEFAULT_SLICE_LINES;
use crate::lens::RepoLens;

const DEFAULT_SEARCH_LIMIT: usize = 20;

/// JSON description of one tool, in the shape agent frameworks expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool surface over a [`RepoLens`] for an agent collaborator.
pub struct RepoTools {
    lens: RepoLens,
}

impl RepoTools {
    pub fn new(lens: RepoLens) -> Self {
        Self { lens }
    }

    pub fn tool_schemas() -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "scan_repository".to_string(),
                description: "Index a repository directory. Re-scanning only re-extracts files whose content changed".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the repository root"
                        },
                        "scope": {
                            "type": "string",
                            "description": "Root-relative subtree to re-index instead of the whole repository"
                        }
                    },
                    "required": ["path"]
                }),
            },
            ToolSchema {
                name: "recommend_files".to_string(),
                description: "Rank the files most relevant to a natural-language question, with the reasons for each".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The question, e.g. 'where is login handled?'"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of files to return"
                        },
                        "folder": {
                            "type": "string",
                            "description": "Root-relative folder to search within, e.g. 'src/auth'"
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolSchema {
                name: "explain_file".to_string(),
                description: "Summarize one file: language, size, imports, symbols, leading documentation and a preview".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Root-relative path of the file"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolSchema {
                name: "find_definition".to_string(),
                description: "Find files declaring a symbol with the given name or a similar one".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Symbol name to look up"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results to return",
                            "default": DEFAULT_SEARCH_LIMIT
                        },
                        "folder": {
                            "type": "string",
                            "description": "Root-relative folder to search within, e.g. 'src/auth'"
                        }
                    },
                    "required": ["name"]
                }),
            },
            ToolSchema {
                name: "fuzzy_search_files".to_string(),
                description: "Fuzzy-match indexed file paths against a pattern".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Pattern to match, e.g. 'authlog' for auth/login.py"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results to return",
                            "default": DEFAULT_SEARCH_LIMIT
                        },
                        "folder": {
                            "type": "string",
                            "description": "Root-relative folder to search within, e.g. 'src/auth'"
                        }
                    },
                    "required": ["pattern"]
                }),
            },
            ToolSchema {
                name: "get_file_content".to_string(),
                description: "Read a window of lines from a file, numbered from 1".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Root-relative path of the file"
                        },
                        "start_line": {
                            "type": "integer",
                            "description": "First line to return",
                            "default": 1
                        },
                        "num_lines": {
                            "type": "integer",
                            "description": "Number of lines to return",
                            "default": DEFAULT_SLICE_LINES
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolSchema {
                name: "get_dependencies".to_string(),
                description: "List a file's imports, the indexed files they resolve to, and the files importing it".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Root-relative path of the file"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolSchema {
                name: "get_repository_overview".to_string(),
                description: "Get file counts, languages and totals for the indexed repository".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "include_file_list": {
                            "type": "boolean",
                            "description": "Whether to include a list of all files",
                            "default": false
                        }
                    }
                }),
            },
        ]
    }

    pub async fn execute_tool(&self, tool_name: &str, input: Value) -> Result<ToolResult> {
        match tool_name {
            "scan_repository" => self.scan_repository(input).await,
            "recommend_files" => self.recommend_files(input).await,
            "explain_file" => self.explain_file(input).await,
            "find_definition" => self.find_definition(input).await,
            "fuzzy_search_files" => self.fuzzy_search_files(input).await,
            "get_file_content" => self.get_file_content(input).await,
            "get_dependencies" => self.get_dependencies(input).await,
            "get_repository_overview" => self.get_repository_overview(input).await,
            _ => Ok(ToolResult::error(format!("Unknown tool: {}", tool_name))),
        }
    }

    async fn scan_repository(&self, input: Value) -> Result<ToolResult> {
        let scan_input: ScanRepositoryInput =
            serde_json::from_value(input).context("Invalid scan_repository input")?;

        let report = match scan_input.scope {
            Some(scope) => {
                let lens = self.lens.clone();
                let root = scan_input.path.clone();
                tokio::task::spawn_blocking(move || {
                    lens.bind_root(&root)?;
                    lens.scan_subtree(&scope)
                })
                .await
                .context("Scan task failed")??
            }
            None => self.lens.scan(&scan_input.path).await?,
        };

        Ok(ToolResult::success(json!({
            "status": "success",
            "path": scan_input.path,
            "generation": report.generation,
            "files_scanned": report.files_scanned,
            "added": report.added.len(),
            "modified": report.modified.len(),
            "removed": report.removed.len(),
            "unchanged": report.unchanged,
            "skipped": report.skipped,
            "degraded": report.degraded,
            "duration_ms": report.duration_ms
        })))
    }

    async fn recommend_files(&self, input: Value) -> Result<ToolResult> {
        let recommend_input: RecommendFilesInput =
            serde_json::from_value(input).context("Invalid recommend_files input")?;

        let limit = recommend_input.limit.unwrap_or(self.lens.config().ranking.top_k);
        let candidates = self
            .lens
            .query_in(&recommend_input.query, limit, recommend_input.folder.as_deref())?;
        let results: Vec<Value> = candidates
            .iter()
            .map(|candidate| {
                json!({
                    "path": candidate.path,
                    "score": candidate.score,
                    "signals": candidate.signals().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                    "rationale": candidate.rationale
                })
            })
            .collect();

        Ok(ToolResult::success(json!({
            "status": "success",
            "query": recommend_input.query,
            "folder": recommend_input.folder,
            "count": results.len(),
            "results": results
        })))
    }

    async fn explain_file(&self, input: Value) -> Result<ToolResult> {
        let explain_input: FilePathInput =
            serde_json::from_value(input).context("Invalid explain_file input")?;

        match self.lens.explain_file(&explain_input.file_path) {
            Ok(overview) => Ok(ToolResult::success(json!({
                "status": "success",
                "file_path": explain_input.file_path,
                "overview": overview,
                "text": overview.to_string()
            }))),
            Err(err) => Ok(ToolResult::error_with_data(json!({
                "status": "error",
                "file_path": explain_input.file_path,
                "error": err.to_string()
            }))),
        }
    }

    async fn find_definition(&self, input: Value) -> Result<ToolResult> {
        let find_input: FindDefinitionInput =
            serde_json::from_value(input).context("Invalid find_definition input")?;

        let matches = self.lens.find_definitions_in(
            &find_input.name,
            find_input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            find_input.folder.as_deref(),
        )?;

        Ok(ToolResult::success(json!({
            "status": "success",
            "name": find_input.name,
            "count": matches.len(),
            "results": matches
        })))
    }

    async fn fuzzy_search_files(&self, input: Value) -> Result<ToolResult> {
        let search_input: FuzzySearchInput =
            serde_json::from_value(input).context("Invalid fuzzy_search_files input")?;

        let results: Vec<Value> = self
            .lens
            .fuzzy_find_files_in(
                &search_input.pattern,
                search_input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                search_input.folder.as_deref(),
            )?
            .into_iter()
            .map(|(path, score)| json!({ "path": path, "score": score }))
            .collect();

        Ok(ToolResult::success(json!({
            "status": "success",
            "pattern": search_input.pattern,
            "count": results.len(),
            "results": results
        })))
    }

    async fn get_file_content(&self, input: Value) -> Result<ToolResult> {
        let content_input: FileContentInput =
            serde_json::from_value(input).context("Invalid get_file_content input")?;

        let start_line = content_input.start_line.unwrap_or(1);
        let num_lines = content_input.num_lines.unwrap_or(DEFAULT_SLICE_LINES);
        match self.lens.file_slice(&content_input.file_path, start_line, num_lines) {
            Ok(slice) => Ok(ToolResult::success(json!({
                "status": "success",
                "file_path": content_input.file_path,
                "start_line": slice.start_line,
                "end_line": slice.end_line,
                "total_lines": slice.total_lines,
                "content": slice.to_string()
            }))),
            Err(err) => Ok(ToolResult::error_with_data(json!({
                "status": "error",
                "file_path": content_input.file_path,
                "error": err.to_string()
            }))),
        }
    }

    async fn get_dependencies(&self, input: Value) -> Result<ToolResult> {
        let deps_input: FilePathInput =
            serde_json::from_value(input).context("Invalid get_dependencies input")?;

        match self.lens.dependencies(&deps_input.file_path) {
            Some(dependencies) => Ok(ToolResult::success(json!({
                "status": "success",
                "file_path": deps_input.file_path,
                "dependencies": dependencies
            }))),
            None => Ok(ToolResult::error(format!("File is not indexed: {}", deps_input.file_path))),
        }
    }

    async fn get_repository_overview(&self, input: Value) -> Result<ToolResult> {
        let overview_input: GetRepositoryOverviewInput = serde_json::from_value(input).unwrap_or_default();

        let metadata = self.lens.stats();
        let mut result = json!({
            "status": "success",
            "root": self.lens.root(),
            "total_files": metadata.total_files,
            "languages": metadata.languages.keys().collect::<Vec<_>>(),
            "metadata": metadata
        });

        if overview_input.include_file_list.unwrap_or(false) {
            let index = self.lens.index();
            let files: Vec<String> = index.read().records().map(|r| r.path.clone()).collect();
            result["files"] = json!(files);
        }

        Ok(ToolResult::success(result))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: json!({}),
            error: Some(message),
        }
    }

    pub fn error_with_data(data: Value) -> Self {
        Self {
            success: false,
            data,
            error: None,
        }
    }
}

// Input types for tool functions
#[derive(Debug, Deserialize)]
struct ScanRepositoryInput {
    path: String,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendFilesInput {
    query: String,
    limit: Option<usize>,
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePathInput {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct FindDefinitionInput {
    name: String,
    limit: Option<usize>,
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FuzzySearchInput {
    pattern: String,
    limit: Option<usize>,
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileContentInput {
    file_path: String,
    start_line: Option<usize>,
    num_lines: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct GetRepositoryOverviewInput {
    include_file_list: Option<bool>,
}
