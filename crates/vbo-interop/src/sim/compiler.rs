//! Mini-Compiler für Füll-Kernel der Form
//!
//! ```text
//! __kernel void NAME(__global float4 *ARG) { ARG[get_global_id(0)] = VALUE; }
//! ```
//!
//! `VALUE` ist ein Skalar (wird auf alle vier Komponenten verteilt) oder
//! `(float4)(a, b, c, d)`. Fehler kommen als Build-Log im Clang-Format.

use crate::Float4;

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledKernel {
    pub entry: String,
    pub fill: Float4,
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Num(f32),
    Punct(char),
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Num(n) => format!("'{n}'"),
            Tok::Punct(c) => format!("'{c}'"),
            Tok::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    line: usize,
    col: usize,
}

struct Diag {
    line: usize,
    col: usize,
    msg: String,
}

/// Übersetzt `source`; im Fehlerfall ist `Err` das vollständige Build-Log.
pub fn compile(source: &str) -> Result<Vec<CompiledKernel>, String> {
    lex(source)
        .and_then(|toks| Parser { toks, pos: 0 }.program())
        .map_err(|d| render(source, &d))
}

fn render(source: &str, d: &Diag) -> String {
    let text = source.lines().nth(d.line.saturating_sub(1)).unwrap_or("");
    let caret = format!("{}^", " ".repeat(d.col.saturating_sub(1)));
    format!(
        "<source>:{}:{}: error: {}\n{}\n{}\n1 error generated.\n",
        d.line, d.col, d.msg, text, caret
    )
}

fn lex(src: &str) -> Result<Vec<Token>, Diag> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let (mut i, mut line, mut col) = (0usize, 1usize, 1usize);

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_col) = (line, col);

        if c == '\n' {
            i += 1;
            line += 1;
            col = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            col += 1;
            continue;
        }
        // Kommentare
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            col += 2;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(Diag { line: start_line, col: start_col, msg: "unterminated /* comment".into() });
                    }
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        col += 2;
                        break;
                    }
                    Some('\n') => {
                        i += 1;
                        line += 1;
                        col = 1;
                    }
                    Some(_) => {
                        i += 1;
                        col += 1;
                    }
                }
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let begin = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            col += i - begin;
            let word: String = chars[begin..i].iter().collect();
            toks.push(Token { tok: Tok::Ident(word), line: start_line, col: start_col });
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let begin = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let digits: String = chars[begin..i].iter().collect();
            if matches!(chars.get(i), Some('f' | 'F')) {
                i += 1;
            }
            col += i - begin;
            let value = digits.parse::<f32>().map_err(|_| Diag {
                line: start_line,
                col: start_col,
                msg: format!("invalid numeric literal '{digits}'"),
            })?;
            toks.push(Token { tok: Tok::Num(value), line: start_line, col: start_col });
            continue;
        }

        if "(){}[]*,;=-".contains(c) {
            i += 1;
            col += 1;
            toks.push(Token { tok: Tok::Punct(c), line: start_line, col: start_col });
            continue;
        }

        return Err(Diag { line, col, msg: format!("unexpected character '{c}'") });
    }

    toks.push(Token { tok: Tok::Eof, line, col });
    Ok(toks)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err_here(&self, msg: String) -> Diag {
        let t = self.peek();
        Diag { line: t.line, col: t.col, msg }
    }

    fn punct(&mut self, c: char) -> Result<(), Diag> {
        if self.peek().tok == Tok::Punct(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.err_here(format!("expected '{c}', found {}", self.peek().tok.describe())))
        }
    }

    fn keyword(&mut self, accepted: &[&str]) -> Result<(), Diag> {
        match self.peek().tok.clone() {
            Tok::Ident(w) if accepted.contains(&w.as_str()) => {
                self.bump();
                Ok(())
            }
            Tok::Ident(w) if accepted.iter().any(|a| a.starts_with("float")) => {
                Err(self.err_here(format!("unknown type name '{w}'")))
            }
            other => Err(self.err_here(format!("expected '{}', found {}", accepted[0], other.describe()))),
        }
    }

    fn ident(&mut self) -> Result<(String, Token), Diag> {
        match self.peek().tok.clone() {
            Tok::Ident(w) => Ok((w, self.bump())),
            other => Err(self.err_here(format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn number(&mut self) -> Result<f32, Diag> {
        let negative = if self.peek().tok == Tok::Punct('-') {
            self.bump();
            true
        } else {
            false
        };
        match self.peek().tok.clone() {
            Tok::Num(n) => {
                self.bump();
                Ok(if negative { -n } else { n })
            }
            other => Err(self.err_here(format!("expected expression, found {}", other.describe()))),
        }
    }

    fn program(mut self) -> Result<Vec<CompiledKernel>, Diag> {
        let mut kernels: Vec<CompiledKernel> = Vec::new();
        while self.peek().tok != Tok::Eof {
            let kernel = self.kernel()?;
            if kernels.iter().any(|k| k.entry == kernel.entry) {
                return Err(self.err_here(format!("redefinition of '{}'", kernel.entry)));
            }
            kernels.push(kernel);
        }
        if kernels.is_empty() {
            return Err(self.err_here("no kernel functions in program".into()));
        }
        Ok(kernels)
    }

    fn kernel(&mut self) -> Result<CompiledKernel, Diag> {
        self.keyword(&["__kernel", "kernel"])?;
        self.keyword(&["void"])?;
        let (entry, _) = self.ident()?;

        self.punct('(')?;
        self.keyword(&["__global", "global"])?;
        self.keyword(&["float4"])?;
        self.punct('*')?;
        let (param, _) = self.ident()?;
        self.punct(')')?;

        self.punct('{')?;
        let (target, at) = self.ident()?;
        if target != param {
            return Err(Diag { line: at.line, col: at.col, msg: format!("use of undeclared identifier '{target}'") });
        }
        self.punct('[')?;
        self.keyword(&["get_global_id"])?;
        self.punct('(')?;
        let dim_at = self.peek().clone();
        let dim = self.number()?;
        if dim != 0.0 {
            return Err(Diag { line: dim_at.line, col: dim_at.col, msg: "only dimension 0 is supported".into() });
        }
        self.punct(')')?;
        self.punct(']')?;
        self.punct('=')?;
        let fill = self.value()?;
        self.punct(';')?;
        self.punct('}')?;

        Ok(CompiledKernel { entry, fill })
    }

    fn value(&mut self) -> Result<Float4, Diag> {
        if self.peek().tok != Tok::Punct('(') {
            return self.number().map(Float4::splat);
        }
        self.punct('(')?;
        self.keyword(&["float4"])?;
        self.punct(')')?;
        self.punct('(')?;
        let mut v = [0.0f32; 4];
        for (i, slot) in v.iter_mut().enumerate() {
            if i > 0 {
                self.punct(',')?;
            }
            *slot = self.number()?;
        }
        self.punct(')')?;
        Ok(Float4(v))
    }
}
