//! Lexical rule sets: per-language regular expressions for declarations and import statements.
//!
//! Extraction is best-effort. Rules only see lines that are not full-line comments, and they never
//! try to resolve an import to a file.

use once_cell::sync::Lazy;
use regex::Regex;

use super::doc::{comment_excerpt, CommentSyntax};
use crate::types::{LanguageTag, StructuralFacts};

/// How the captures of an import pattern become import targets.
#[derive(Debug, Clone, Copy)]
enum ImportShape {
    /// Capture 1 verbatim, whitespace collapsed.
    Whole,
    /// Capture 1 is a comma list; each item loses any `as alias` suffix.
    CommaList,
    /// Capture 1 is the module, capture 2 the imported names. Purely relative modules
    /// (`from . import x`) yield one target per name (`.x`).
    PythonFrom,
    /// Capture 1 is a block body holding one or more quoted targets.
    QuotedBlock,
}

#[derive(Debug)]
struct ImportRule {
    pattern: Regex,
    shape: ImportShape,
}

#[derive(Debug)]
pub struct RuleSet {
    pub language: LanguageTag,
    pub comments: CommentSyntax,
    symbols: Vec<Regex>,
    imports: Vec<ImportRule>,
    /// Words a declaration pattern may capture that are never symbols (`if (` in C).
    reserved: &'static [&'static str],
}

static QUOTED: Lazy<Regex> = Lazy::new(|| re(r#""([^"]+)""#));

static RUST_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::Rust,
    comments: CommentSyntax::RUST,
    symbols: vec![
        re(r#"(?m)^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)"#),
        re(r"(?m)^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|union|trait|type|mod)\s+([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:const|static)\s+(?:mut\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*:"),
        re(r"(?m)^\s*macro_rules!\s*([A-Za-z_][A-Za-z0-9_]*)"),
    ],
    imports: vec![
        import(r"(?m)^\s*(?:pub(?:\s*\([^)]*\))?\s+)?use\s+([^;]+);", ImportShape::Whole),
        import(r"(?m)^\s*(?:pub(?:\s*\([^)]*\))?\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)\s*;", ImportShape::Whole),
        import(r"(?m)^\s*extern\s+crate\s+([A-Za-z_][A-Za-z0-9_]*)", ImportShape::Whole),
    ],
    reserved: &[],
});

static PYTHON_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::Python,
    comments: CommentSyntax::HASH,
    symbols: vec![
        re(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^[ \t]*class[ \t]+([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^([A-Z][A-Z0-9_]+)[ \t]*(?::[^=\n]+)?=[^=]"),
    ],
    imports: vec![
        import(
            r"(?m)^[ \t]*import[ \t]+([A-Za-z0-9_.]+(?:[ \t]+as[ \t]+[A-Za-z0-9_]+)?(?:[ \t]*,[ \t]*[A-Za-z0-9_.]+(?:[ \t]+as[ \t]+[A-Za-z0-9_]+)?)*)",
            ImportShape::CommaList,
        ),
        import(
            r"(?m)^[ \t]*from[ \t]+(\.*[A-Za-z0-9_.]*)[ \t]+import[ \t]+\(?([A-Za-z0-9_*, \t]+)",
            ImportShape::PythonFrom,
        ),
    ],
    reserved: &[],
});

const JS_SYMBOLS: &[&str] = &[
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*([A-Za-z_$][A-Za-z0-9_$]*)",
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?class[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)",
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)[ \t]*(?::[^=\n]+)?=",
];

const JS_IMPORTS: &[&str] = &[
    r#"(?m)^[ \t]*import[ \t]+(?:[^'";]*?[ \t]+from[ \t]*)?['"]([^'"]+)['"]"#,
    r#"(?m)^[ \t]*export[ \t]+[^'";]*?[ \t]+from[ \t]*['"]([^'"]+)['"]"#,
    r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#,
    r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#,
];

static JAVASCRIPT_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::JavaScript,
    comments: CommentSyntax::C_LIKE,
    symbols: JS_SYMBOLS.iter().map(|p| re(p)).collect(),
    imports: JS_IMPORTS.iter().map(|p| import(p, ImportShape::Whole)).collect(),
    reserved: &[],
});

static TYPESCRIPT_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut symbols: Vec<Regex> = JS_SYMBOLS.iter().map(|p| re(p)).collect();
    symbols.extend([
        re(r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?interface[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)"),
        re(r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?type[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)[ \t]*(?:<[^>]*>)?[ \t]*="),
        re(r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?(?:const[ \t]+)?enum[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)"),
        re(r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?namespace[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)"),
    ]);
    RuleSet {
        language: LanguageTag::TypeScript,
        comments: CommentSyntax::C_LIKE,
        symbols,
        imports: JS_IMPORTS.iter().map(|p| import(p, ImportShape::Whole)).collect(),
        reserved: &[],
    }
});

static GO_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::Go,
    comments: CommentSyntax::C_LIKE,
    symbols: vec![
        re(r"(?m)^func[ \t]+(?:\([^)]*\)[ \t]*)?([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^type[ \t]+([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]+(?:struct|interface)[ \t]*\{"),
        re(r"(?m)^(?:var|const)[ \t]+([A-Za-z_][A-Za-z0-9_]*)"),
    ],
    imports: vec![
        import(r#"(?m)^import[ \t]+(?:[A-Za-z_.][A-Za-z0-9_]*[ \t]+)?"([^"]+)""#, ImportShape::Whole),
        import(r"(?ms)^import[ \t]*\((.*?)\)", ImportShape::QuotedBlock),
    ],
    reserved: &[],
});

static JAVA_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::Java,
    comments: CommentSyntax::C_LIKE,
    symbols: vec![
        re(r"(?m)^[ \t]*(?:(?:public|protected|private|static|final|abstract|sealed|non-sealed|strictfp)[ \t]+)*(?:class|interface|enum|record|@interface)[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)"),
        re(r"(?m)^[ \t]*(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)[ \t]+)+(?:<[^>\n]+>[ \t]+)?[A-Za-z_$][A-Za-z0-9_$<>\[\],.? ]*[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)[ \t]*\("),
    ],
    imports: vec![import(
        r"(?m)^[ \t]*import[ \t]+(?:static[ \t]+)?([A-Za-z0-9_.]+(?:\.\*)?)[ \t]*;",
        ImportShape::Whole,
    )],
    reserved: &["if", "for", "while", "switch", "catch", "return", "new", "else", "synchronized"],
});

const C_RESERVED: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "else", "do", "catch", "case", "defined",
];

const C_SYMBOLS: &[&str] = &[
    r"(?m)^[ \t]*(?:typedef[ \t]+)?(?:struct|union|enum)[ \t]+([A-Za-z_][A-Za-z0-9_]*)",
    r"(?m)^[ \t]*#[ \t]*define[ \t]+([A-Za-z_][A-Za-z0-9_]*)",
    r"(?m)^[A-Za-z_][A-Za-z0-9_ \t\*&:<>,]*?[ \t\*&]([A-Za-z_~][A-Za-z0-9_:~]*)[ \t]*\([^;{)]*\)\s*(?:const\s*)?(?:noexcept\s*)?\{",
];

const C_INCLUDE: &str = r#"(?m)^[ \t]*#[ \t]*include[ \t]*[<"]([^>"]+)[>"]"#;

static C_RULES: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    language: LanguageTag::C,
    comments: CommentSyntax::C_LIKE,
    symbols: C_SYMBOLS.iter().map(|p| re(p)).collect(),
    imports: vec![import(C_INCLUDE, ImportShape::Whole)],
    reserved: C_RESERVED,
});

static CPP_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut symbols: Vec<Regex> = C_SYMBOLS.iter().map(|p| re(p)).collect();
    symbols.extend([
        re(r"(?m)^[ \t]*(?:template[ \t]*<[^>\n]*>[ \t]*)?(?:class|struct)[ \t]+(?:[A-Z_]+_API[ \t]+)?([A-Za-z_][A-Za-z0-9_]*)"),
        re(r"(?m)^[ \t]*namespace[ \t]+([A-Za-z_][A-Za-z0-9_]*)"),
    ]);
    RuleSet {
        language: LanguageTag::Cpp,
        comments: CommentSyntax::C_LIKE,
        symbols,
        imports: vec![
            import(C_INCLUDE, ImportShape::Whole),
            import(r"(?m)^[ \t]*(?:export[ \t]+)?import[ \t]+([A-Za-z0-9_.:]+)[ \t]*;", ImportShape::Whole),
        ],
        reserved: C_RESERVED,
    }
});

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in extraction pattern must compile")
}

fn import(pattern: &str, shape: ImportShape) -> ImportRule {
    ImportRule {
        pattern: re(pattern),
        shape,
    }
}

/// The rule set for a language, or `None` when it has to fall back to minimal facts.
pub fn rules_for(language: LanguageTag) -> Option<&'static RuleSet> {
    let rules: &'static RuleSet = match language {
        LanguageTag::Rust => &RUST_RULES,
        LanguageTag::Python => &PYTHON_RULES,
        LanguageTag::JavaScript => &JAVASCRIPT_RULES,
        LanguageTag::TypeScript => &TYPESCRIPT_RULES,
        LanguageTag::Go => &GO_RULES,
        LanguageTag::Java => &JAVA_RULES,
        LanguageTag::C => &C_RULES,
        LanguageTag::Cpp => &CPP_RULES,
        LanguageTag::Unknown => return None,
    };
    Some(rules)
}

impl RuleSet {
    pub fn apply(&self, path: &str, text: &str) -> StructuralFacts {
        let code = self.mask_line_comments(text);
        let mut facts = StructuralFacts::new(path);

        for pattern in &self.symbols {
            for caps in pattern.captures_iter(&code) {
                if let Some(name) = caps.get(1).map(|m| m.as_str()) {
                    if !self.is_reserved(name) {
                        facts.symbols.insert(name.to_string());
                    }
                }
            }
        }

        // Collect with offsets so imports keep source order across rules
        let mut found: Vec<(usize, String)> = Vec::new();
        for rule in &self.imports {
            for caps in rule.pattern.captures_iter(&code) {
                let Some(whole) = caps.get(0) else { continue };
                let offset = whole.start();
                match rule.shape {
                    ImportShape::Whole => {
                        if let Some(target) = caps.get(1) {
                            found.push((offset, collapse(target.as_str())));
                        }
                    }
                    ImportShape::CommaList => {
                        if let Some(list) = caps.get(1) {
                            for item in list.as_str().split(',') {
                                if let Some(name) = item.split_whitespace().next() {
                                    found.push((offset, name.to_string()));
                                }
                            }
                        }
                    }
                    ImportShape::PythonFrom => {
                        let module = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                        let names = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                        for target in python_from_targets(module, names) {
                            found.push((offset, target));
                        }
                    }
                    ImportShape::QuotedBlock => {
                        if let Some(body) = caps.get(1) {
                            for quoted in QUOTED.captures_iter(body.as_str()) {
                                if let Some(target) = quoted.get(1) {
                                    found.push((body.start() + target.start(), target.as_str().to_string()));
                                }
                            }
                        }
                    }
                }
            }
        }
        found.sort_by_key(|(offset, _)| *offset);
        for (_, target) in found {
            facts.push_import(target);
        }

        facts.doc_excerpt = comment_excerpt(text, &self.comments);
        facts
    }

    fn is_reserved(&self, name: &str) -> bool {
        let last = name.rsplit("::").next().unwrap_or(name);
        self.reserved.contains(&last)
    }

    /// Blank out full-line comments, keeping line structure intact.
    fn mask_line_comments(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            if self.comments.is_comment_line(line) {
                if line.ends_with('\n') {
                    out.push('\n');
                }
            } else {
                out.push_str(line);
            }
        }
        out
    }
}

fn python_from_targets(module: &str, names: &str) -> Vec<String> {
    if module.is_empty() {
        return Vec::new();
    }
    if !module.chars().all(|c| c == '.') {
        return vec![module.to_string()];
    }

    let mut targets = Vec::new();
    for item in names.split(',') {
        match item.split_whitespace().next() {
            Some("*") | None => {}
            Some(name) => targets.push(format!("{}{}", module, name)),
        }
    }
    if targets.is_empty() {
        targets.push(module.to_string());
    }
    targets
}

fn collapse(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(language: LanguageTag, path: &str, text: &str) -> StructuralFacts {
        rules_for(language).unwrap().apply(path, text)
    }

    #[test]
    fn test_rust_rules() {
        let source = r#"//! Session store.

use std::collections::HashMap;
use crate::auth::{login, logout};
mod tokens;

pub struct SessionStore {
    inner: HashMap<String, String>,
}

pub(crate) trait Expire {}

impl SessionStore {
    pub async fn refresh(&self) {}
    fn evict(&mut self) {}
}

pub const MAX_AGE: u64 = 3600;
macro_rules! session_log { () => {} }
// fn commented_out() {}
"#;
        let facts = facts(LanguageTag::Rust, "src/session.rs", source);
        for name in ["SessionStore", "Expire", "refresh", "evict", "MAX_AGE", "session_log", "tokens"] {
            assert!(facts.symbols.contains(name), "missing {}", name);
        }
        assert!(!facts.symbols.contains("commented_out"));
        assert_eq!(
            facts.imports,
            vec!["std::collections::HashMap", "crate::auth::{login, logout}", "tokens"]
        );
        assert_eq!(facts.doc_excerpt, "Session store.");
    }

    #[test]
    fn test_python_rules() {
        let source = r#""""Login views."""
import os, sys as system
from . import session
from .models import User
from ..util import helpers
import hashlib

TIMEOUT = 30

class LoginForm:
    def validate(self):
        pass

async def authenticate(user):
    # import fake
    return True
"#;
        let facts = facts(LanguageTag::Python, "auth/login.py", source);
        assert_eq!(
            facts.imports,
            vec!["os", "sys", ".session", ".models", "..util", "hashlib"]
        );
        for name in ["LoginForm", "validate", "authenticate", "TIMEOUT"] {
            assert!(facts.symbols.contains(name), "missing {}", name);
        }
        assert_eq!(facts.doc_excerpt, "Login views.");
    }

    #[test]
    fn test_javascript_and_typescript_rules() {
        let js = r#"import React from 'react';
import { useState,
  useEffect } from "react-dom";
const api = require('./api');
export default function App() {}
export class Store {}
export * from './types';
"#;
        let facts_js = facts(LanguageTag::JavaScript, "web/app.js", js);
        assert_eq!(facts_js.imports, vec!["react", "react-dom", "./api", "./types"]);
        for name in ["App", "Store", "api"] {
            assert!(facts_js.symbols.contains(name), "missing {}", name);
        }

        let ts = "export interface Session { id: string }\nexport type Token = string;\nenum Role { Admin }\nconst limit: number = 5;\n";
        let facts_ts = facts(LanguageTag::TypeScript, "web/session.ts", ts);
        for name in ["Session", "Token", "Role", "limit"] {
            assert!(facts_ts.symbols.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_go_import_block() {
        let source = r#"// Package server runs the API.
package server

import (
	"fmt"
	log "github.com/sirupsen/logrus"
)

import "os"

type Server struct{}

func (s *Server) Start() error { return nil }

func New() *Server { return &Server{} }
"#;
        let facts = facts(LanguageTag::Go, "server/server.go", source);
        assert_eq!(facts.imports, vec!["fmt", "github.com/sirupsen/logrus", "os"]);
        for name in ["Server", "Start", "New"] {
            assert!(facts.symbols.contains(name), "missing {}", name);
        }
        assert_eq!(facts.doc_excerpt, "Package server runs the API.");
    }

    #[test]
    fn test_java_rules() {
        let source = r#"package com.example.auth;

import java.util.List;
import static org.junit.Assert.*;

public class LoginService {
    private final List<String> users;

    public boolean login(String user) {
        if (user == null) {
            return false;
        }
        return true;
    }
}
"#;
        let facts = facts(LanguageTag::Java, "src/LoginService.java", source);
        assert_eq!(facts.imports, vec!["java.util.List", "org.junit.Assert.*"]);
        assert!(facts.symbols.contains("LoginService"));
        assert!(facts.symbols.contains("login"));
        assert!(!facts.symbols.contains("if"));
    }

    #[test]
    fn test_c_and_cpp_rules() {
        let c = "#include <stdio.h>\n#include \"util.h\"\n#define BUF_SIZE 64\n\nstruct point { int x; };\n\nstatic int add(int a, int b)\n{\n    if (a) {\n        return a + b;\n    }\n    return b;\n}\n";
        let facts_c = facts(LanguageTag::C, "src/math.c", c);
        assert_eq!(facts_c.imports, vec!["stdio.h", "util.h"]);
        for name in ["BUF_SIZE", "point", "add"] {
            assert!(facts_c.symbols.contains(name), "missing {}", name);
        }
        assert!(!facts_c.symbols.contains("if"));

        let cpp = "#include <vector>\nnamespace geo {\nclass Shape {};\n}\nvoid Shape::draw() const {\n}\n";
        let facts_cpp = facts(LanguageTag::Cpp, "src/shape.cpp", cpp);
        assert_eq!(facts_cpp.imports, vec!["vector"]);
        for name in ["geo", "Shape", "Shape::draw"] {
            assert!(facts_cpp.symbols.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_unknown_has_no_rules() {
        assert!(rules_for(LanguageTag::Unknown).is_none());
    }
}
