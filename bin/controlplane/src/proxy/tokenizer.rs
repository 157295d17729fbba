//! A brace-aware tokenizer for nginx-style configs. Deliberately
//! minimal: it recovers enough structure (directives, blocks) to
//! render upstreams/servers/locations for the UI without implementing
//! the full nginx grammar.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
  /// The header text up to `{`, eg `server` or `location /api`.
  pub header: String,
  pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
  /// A `;`-terminated directive, eg `listen 443 ssl;`.
  Directive(String),
  Block(Block),
}

pub fn parse(input: &str) -> anyhow::Result<Vec<Node>> {
  let chars: Vec<char> = input.chars().collect();
  let mut pos = 0;
  let (nodes, end) = parse_body(&chars, 0)?;
  pos = end;
  // Trailing content after the final top-level node must be whitespace/comments only.
  skip_whitespace_and_comments(&chars, &mut pos);
  Ok(nodes)
}

fn skip_whitespace_and_comments(chars: &[char], pos: &mut usize) {
  loop {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
      *pos += 1;
    }
    if *pos < chars.len() && chars[*pos] == '#' {
      while *pos < chars.len() && chars[*pos] != '\n' {
        *pos += 1;
      }
      continue;
    }
    break;
  }
}

fn parse_body(chars: &[char], mut pos: usize) -> anyhow::Result<(Vec<Node>, usize)> {
  let mut nodes = Vec::new();
  loop {
    skip_whitespace_and_comments(chars, &mut pos);
    if pos >= chars.len() || chars[pos] == '}' {
      return Ok((nodes, pos));
    }

    let header_start = pos;
    while pos < chars.len() && chars[pos] != '{' && chars[pos] != ';' {
      pos += 1;
    }
    if pos >= chars.len() {
      anyhow::bail!("unterminated directive near byte {header_start}");
    }

    let header: String = chars[header_start..pos].iter().collect();
    let header = header.trim().to_string();

    if chars[pos] == ';' {
      pos += 1;
      if !header.is_empty() {
        nodes.push(Node::Directive(header));
      }
      continue;
    }

    // chars[pos] == '{'
    pos += 1;
    let (children, after) = parse_body(chars, pos)?;
    if after >= chars.len() || chars[after] != '}' {
      anyhow::bail!("unmatched '{{' in block `{header}`");
    }
    pos = after + 1;
    nodes.push(Node::Block(Block { header, children }));
  }
}

pub fn render(nodes: &[Node], indent: usize) -> String {
  let pad = "    ".repeat(indent);
  let mut out = String::new();
  for node in nodes {
    match node {
      Node::Directive(d) => {
        out.push_str(&pad);
        out.push_str(d);
        out.push_str(";\n");
      }
      Node::Block(b) => {
        out.push_str(&pad);
        out.push_str(&b.header);
        out.push_str(" {\n");
        out.push_str(&render(&b.children, indent + 1));
        out.push_str(&pad);
        out.push_str("}\n");
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_nested_blocks() {
    let input = r#"
      upstream app_a {
        server 127.0.0.1:8080;
      }
      server {
        listen 443 ssl;
        location /api {
          proxy_pass http://app_a;
        }
      }
    "#;
    let nodes = parse(input).unwrap();
    assert_eq!(nodes.len(), 2);
    let Node::Block(upstream) = &nodes[0] else { panic!("expected block") };
    assert_eq!(upstream.header, "upstream app_a");
    assert_eq!(upstream.children, vec![Node::Directive("server 127.0.0.1:8080".to_string())]);
  }

  #[test]
  fn rejects_unmatched_brace() {
    assert!(parse("server { listen 80;").is_err());
  }

  #[test]
  fn ignores_comments() {
    let input = "# a comment\nserver {\n  listen 80; # inline\n}\n";
    let nodes = parse(input).unwrap();
    assert_eq!(nodes.len(), 1);
  }
}
