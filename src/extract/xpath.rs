//! Translation of simple XPath location paths into CSS selectors.
//!
//! Portal scrapers are usually written against XPath (`//div[@class='x']/span`),
//! while `scraper` only understands CSS. The subset below covers the paths
//! people actually copy out of browser dev tools:
//!
//! * `/` (child) and `//` (descendant) steps with a tag name or `*`
//! * `[@attr='value']`, `[@attr]`, `[contains(@attr, 'value')]`, joined by `and`
//! * `[N]` and `[last()]` positional predicates
//! * a final `/text()` (ignored) or `/@attr` (read the attribute)
//!
//! The first absolute step is not anchored to the document root.

use super::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSelector {
    pub css: String,
    /// Attribute to read instead of the element text.
    pub attribute: Option<String>,
}

pub fn compile_selector(selector: &str) -> Result<CompiledSelector, ExtractError> {
    let selector = selector.trim();
    if !selector.starts_with('/') {
        return Ok(CompiledSelector {
            css: selector.to_string(),
            attribute: None,
        });
    }
    let (css, attribute) =
        translate_path(selector).map_err(|reason| ExtractError::UnsupportedXPath {
            selector: selector.to_string(),
            reason,
        })?;
    Ok(CompiledSelector { css, attribute })
}

fn translate_path(xpath: &str) -> Result<(String, Option<String>), String> {
    let steps = split_steps(xpath)?;
    let mut css = String::new();
    let mut attribute = None;

    for (index, (descendant, step)) in steps.iter().enumerate() {
        let is_last = index == steps.len() - 1;
        if step == "text()" {
            if !is_last {
                return Err("text() must be the final step".to_string());
            }
            continue;
        }
        if let Some(name) = step.strip_prefix('@') {
            if !is_last {
                return Err("an attribute step must be the final step".to_string());
            }
            if !is_name(name) {
                return Err(format!("invalid attribute name '{name}'"));
            }
            attribute = Some(name.to_string());
            continue;
        }

        if !css.is_empty() {
            css.push_str(if *descendant { " " } else { " > " });
        }
        css.push_str(&translate_step(step)?);
    }

    if css.is_empty() {
        return Err("path selects no element".to_string());
    }
    Ok((css, attribute))
}

/// Splits `//a/b[@x='/']` into `[(true, "a"), (false, "b[@x='/']")]`.
fn split_steps(xpath: &str) -> Result<Vec<(bool, String)>, String> {
    let mut steps = Vec::new();
    let mut chars = xpath.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '/' {
            return Err(format!("expected '/' but found '{c}'"));
        }
        let descendant = chars.peek() == Some(&'/');
        if descendant {
            chars.next();
        }

        let mut step = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(&c) = chars.peek() {
            match (quote, c) {
                (Some(q), _) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '[') => depth += 1,
                (None, ']') => depth = depth.checked_sub(1).ok_or("unbalanced ']'")?,
                (None, '/') if depth == 0 => break,
                _ => {}
            }
            step.push(c);
            chars.next();
        }
        if quote.is_some() || depth != 0 {
            return Err("unterminated predicate".to_string());
        }
        let step = step.trim().to_string();
        if step.is_empty() {
            return Err("empty step".to_string());
        }
        steps.push((descendant, step));
    }
    Ok(steps)
}

fn translate_step(step: &str) -> Result<String, String> {
    let (name, predicates) = match step.find('[') {
        Some(pos) => step.split_at(pos),
        None => (step, ""),
    };
    let name = name.trim();
    if name.contains("::") {
        return Err(format!("axis steps are not supported ('{name}')"));
    }
    if name != "*" && !is_name(name) {
        return Err(format!("invalid node test '{name}'"));
    }

    let any_element = name == "*";
    let mut css = name.to_string();
    for (index, predicate) in split_predicates(predicates)?.iter().enumerate() {
        let predicate = predicate.trim();
        if let Some(position) = positional(predicate, any_element)? {
            // After a filter, XPath counts only the filtered nodes; CSS cannot.
            if index > 0 {
                return Err("a positional predicate must come before any other predicate".to_string());
            }
            css.push_str(&position);
            continue;
        }
        for clause in split_clauses(predicate) {
            css.push_str(&translate_predicate(clause.trim())?);
        }
    }
    Ok(css)
}

/// `[N]` and `[last()]`. `*` counts every element sibling, a name only its own tag.
fn positional(predicate: &str, any_element: bool) -> Result<Option<String>, String> {
    if let Ok(position) = predicate.parse::<usize>() {
        if position == 0 {
            return Err("positions start at 1".to_string());
        }
        let pseudo = if any_element { "nth-child" } else { "nth-of-type" };
        return Ok(Some(format!(":{pseudo}({position})")));
    }
    if predicate == "last()" {
        let pseudo = if any_element { ":last-child" } else { ":last-of-type" };
        return Ok(Some(pseudo.to_string()));
    }
    Ok(None)
}

/// Splits a predicate on `and` outside string literals.
fn split_clauses(predicate: &str) -> Vec<&str> {
    const AND: &str = " and ";
    let mut clauses = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in predicate.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ' ') if i >= start && predicate[i..].starts_with(AND) => {
                clauses.push(&predicate[start..i]);
                start = i + AND.len();
            }
            _ => {}
        }
    }
    clauses.push(&predicate[start..]);
    clauses
}

fn split_predicates(predicates: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut rest = predicates.trim();
    while !rest.is_empty() {
        let body = rest.strip_prefix('[').ok_or("expected '['")?;
        let mut quote: Option<char> = None;
        let mut end = None;
        for (i, c) in body.char_indices() {
            match (quote, c) {
                (Some(q), _) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, ']') => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let end = end.ok_or("unterminated predicate")?;
        out.push(body[..end].to_string());
        rest = body[end + 1..].trim_start();
    }
    Ok(out)
}

fn translate_predicate(clause: &str) -> Result<String, String> {
    if let Some(args) = clause
        .strip_prefix("contains(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let (attr, value) = args
            .split_once(',')
            .ok_or("contains() takes two arguments")?;
        let attr = attribute_name(attr.trim())?;
        let value = string_literal(value.trim())?;
        return Ok(format!("[{attr}*=\"{}\"]", escape_css(&value)));
    }
    if clause.starts_with('@') {
        return match clause.split_once('=') {
            Some((attr, value)) => {
                let attr = attribute_name(attr.trim())?;
                let value = string_literal(value.trim())?;
                Ok(format!("[{attr}=\"{}\"]", escape_css(&value)))
            }
            None => Ok(format!("[{}]", attribute_name(clause)?)),
        };
    }
    Err(format!("unsupported predicate '{clause}'"))
}

fn attribute_name(raw: &str) -> Result<&str, String> {
    let name = raw
        .strip_prefix('@')
        .ok_or_else(|| format!("expected an attribute, found '{raw}'"))?;
    if is_name(name) {
        Ok(name)
    } else {
        Err(format!("invalid attribute name '{name}'"))
    }
}

fn string_literal(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && (open == '\'' || open == '"') => {
            Ok(chars.collect())
        }
        _ => Err(format!("expected a quoted string, found '{raw}'")),
    }
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn escape_css(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
