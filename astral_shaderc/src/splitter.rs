//! Split a combined shader file into GLSL for each stage.
//!
//! A shader file uses directives to mark where each stage begins.
//! ```text
//! #vertex
//! #version 450
//! ...
//! #fragment
//! #version 450
//! ...
//! ```
//! `#material Name` registers a material whose parameters are later
//! filled in from a storage buffer with an element struct named `Name`.
//! `#include` directives are removed.
//! Other directives like `#version` or `#define` are kept.
use indexmap::IndexMap;
use log::debug;

use crate::{
    error::CompileError,
    tokenizer::{Keyword, Token, TokenKind, TokenStream, Tokenizer},
    Material, ShaderStage,
};

/// The GLSL source for each stage of a complete shader program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StageSources {
    VertexFragment { vertex: String, fragment: String },
    Compute { compute: String },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SplitShader {
    pub stages: StageSources,
    /// Materials in declaration order without any parameters.
    pub materials: IndexMap<String, Material>,
}

#[derive(Debug, Default)]
struct StageBuffers {
    vertex: Option<String>,
    fragment: Option<String>,
    compute: Option<String>,
}

impl StageBuffers {
    fn get_mut(&mut self, stage: ShaderStage) -> &mut Option<String> {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Fragment => &mut self.fragment,
            ShaderStage::Compute => &mut self.compute,
        }
    }
}

/// Split `source` into per stage GLSL and collect declared materials.
pub fn split_stages(source: &str) -> Result<SplitShader, CompileError> {
    let mut tokens = tokenize(source)?;

    let mut stage = None;
    let mut buffers = StageBuffers::default();
    let mut materials = IndexMap::new();
    let mut pieces = Vec::new();

    loop {
        let token = tokens.next_token();
        match token.kind {
            TokenKind::Hash => {
                let directive = tokens.next_token();
                if let Some(next_stage) = stage_marker(&directive) {
                    flush(&mut pieces, stage, &mut buffers);
                    if buffers.get_mut(next_stage).is_some() {
                        return Err(CompileError::DuplicateStage { stage: next_stage });
                    }
                    stage = Some(next_stage);
                } else if directive.is_keyword(Keyword::End) {
                    return Err(CompileError::UnmatchedEnd {
                        line: directive.line,
                    });
                } else if directive.is_keyword(Keyword::Material) {
                    let name = tokens.next_token();
                    if name.kind != TokenKind::Identifier {
                        return Err(CompileError::MissingMaterialName {
                            line: directive.line,
                        });
                    }
                    if materials.contains_key(name.text) {
                        return Err(CompileError::DuplicateMaterial {
                            name: name.text.to_string(),
                        });
                    }
                    materials.insert(name.text.to_string(), Material::default());
                } else {
                    // The directive name and any following tokens use the normal spacing.
                    pieces.push(token.text);
                    pieces.push(directive.text);
                    pieces.push(" ");
                }
            }
            TokenKind::Eof => {
                flush(&mut pieces, stage, &mut buffers);
                break;
            }
            _ => push_token(&mut pieces, &token, &tokens.peek_token()),
        }
    }

    let stages = match buffers {
        StageBuffers {
            vertex: Some(vertex),
            fragment: Some(fragment),
            compute: None,
        } => StageSources::VertexFragment { vertex, fragment },
        StageBuffers {
            vertex: None,
            fragment: None,
            compute: Some(compute),
        } => StageSources::Compute { compute },
        _ => return Err(CompileError::IncompleteShader),
    };

    Ok(SplitShader { stages, materials })
}

/// Tokenize the entire file and remove `#include` directives.
fn tokenize(source: &str) -> Result<TokenStream<'_>, CompileError> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token();
        match token.kind {
            TokenKind::Invalid => {
                return Err(CompileError::InvalidCharacter { line: token.line });
            }
            TokenKind::Eof => {
                tokens.push(token);
                break;
            }
            TokenKind::Hash if tokenizer.peek_token().is_keyword(Keyword::Include) => {
                let include = tokenizer.next_token();
                let path = tokenizer.next_token();
                if path.kind != TokenKind::MacroString {
                    return Err(CompileError::MissingIncludePath { line: include.line });
                }
                debug!("Removed #include {} on line {}", path.text, include.line);
            }
            _ => tokens.push(token),
        }
    }
    Ok(TokenStream::new(tokens))
}

fn stage_marker(token: &Token) -> Option<ShaderStage> {
    match token.kind {
        TokenKind::Keyword(Keyword::Vertex) => Some(ShaderStage::Vertex),
        TokenKind::Keyword(Keyword::Fragment) => Some(ShaderStage::Fragment),
        TokenKind::Keyword(Keyword::Compute) => Some(ShaderStage::Compute),
        _ => None,
    }
}

fn push_token<'a>(pieces: &mut Vec<&'a str>, token: &Token<'a>, next: &Token<'a>) {
    pieces.push(token.text);

    let joins_next = matches!(token.kind, TokenKind::Newline | TokenKind::Period)
        || matches!(
            next.kind,
            TokenKind::Period
                | TokenKind::Comma
                | TokenKind::LParen
                | TokenKind::RParen
                | TokenKind::Semicolon
        );
    if !joins_next {
        pieces.push(" ");
    }
}

/// Move the accumulated text into the buffer for `stage`.
/// Text outside of any stage is discarded.
fn flush(pieces: &mut Vec<&str>, stage: Option<ShaderStage>, buffers: &mut StageBuffers) {
    if pieces.is_empty() {
        return;
    }
    if let Some(stage) = stage {
        *buffers.get_mut(stage) = Some(pieces.concat());
    }
    pieces.clear();
}
