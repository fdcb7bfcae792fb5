//! KiCad S-表达式读写
//!
//! 只区分三种节点：符号、带引号的字符串和列表。
//! 读取用于解析板文件头部（版本、网络、图层），写出用于生成新的板元素。

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("Trailing input at offset {0}")]
    TrailingInput(usize),
    #[error("Nesting too deep at offset {0}")]
    TooDeep(usize),
}

/// 列表的最大嵌套层数
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    /// 裸符号或数字，如 `zone`、`0.2`
    Symbol(String),
    /// 带引号的字符串，如 `"F.Cu"`
    Str(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn symbol(s: impl Into<String>) -> Self {
        SExp::Symbol(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        SExp::Str(s.into())
    }

    /// 以符号开头的列表，如 `(head items...)`
    pub fn node(head: &str, items: impl IntoIterator<Item = SExp>) -> Self {
        let mut list = vec![SExp::symbol(head)];
        list.extend(items);
        SExp::List(list)
    }

    /// 符号或字符串的文本内容
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SExp::Symbol(s) | SExp::Str(s) => Some(s),
            SExp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    /// 列表首个符号
    pub fn head(&self) -> Option<&str> {
        match self.as_list()?.first()? {
            SExp::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// 第 `index` 个参数（不含首个符号）
    pub fn arg(&self, index: usize) -> Option<&SExp> {
        self.as_list()?.get(index + 1)
    }

    /// 所有以 `key` 开头的直接子列表
    pub fn children<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a SExp> + 'a {
        let key = key.to_owned();
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |item| item.head() == Some(key.as_str()))
    }

    /// 第一个以 `key` 开头的直接子列表
    pub fn child<'a>(&'a self, key: &str) -> Option<&'a SExp> {
        self.children(key).next()
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Symbol(s) => write!(f, "{}", s),
            SExp::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        _ => write!(f, "{}", ch)?,
                    }
                }
                write!(f, "\"")
            }
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// 解析完整输入，根之后只允许空白
pub fn parse(input: &str) -> Result<SExp, ParseError> {
    let mut parser = SExpParser::new(input);
    let root = parser.parse()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(ParseError::TrailingInput(parser.pos));
    }
    Ok(root)
}

pub struct SExpParser<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> SExpParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            text: input,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(ParseError::UnexpectedEof),
            Some(b'(') => self.parse_list(),
            Some(b')') => Err(ParseError::UnexpectedChar(')', self.pos)),
            Some(b'"') => self.parse_string(),
            Some(_) => Ok(self.parse_symbol()),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep(self.pos));
        }
        self.depth += 1;
        // 跳过 '('
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof),
                Some(b')') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(SExp::List(items));
                }
                Some(_) => items.push(self.parse()?),
            }
        }
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut bytes = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'"' => {
                    return Ok(SExp::Str(String::from_utf8_lossy(&bytes).into_owned()));
                }
                b'\\' => {
                    let escaped = self.peek().ok_or(ParseError::UnterminatedString(start))?;
                    self.pos += 1;
                    bytes.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        other => other,
                    });
                }
                other => bytes.push(other),
            }
        }
        Err(ParseError::UnterminatedString(start))
    }

    fn parse_symbol(&mut self) -> SExp {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        SExp::Symbol(self.text[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}
