// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:(?:public|weak)\s+)?(?:"([^"]*)"|'([^']*)')\s*;"#)
        .expect("import pattern is valid")
});

/// Returns the paths imported by a proto file, sorted and deduplicated. Imports inside
/// comments are ignored.
pub fn parse_imports(content: &str) -> BTreeSet<String> {
    let stripped = strip_comments(content);
    IMPORT_REGEX
        .captures_iter(&stripped)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|path| path.as_str().to_string())
        .collect()
}

/// Replaces `//` and `/* */` comments with whitespace, leaving string literals intact.
fn strip_comments(content: &str) -> String {
    let mut stripped = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                stripped.push(c);
                let mut escaped = false;
                for next in chars.by_ref() {
                    stripped.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c || next == '\n' {
                        break;
                    }
                }
            },
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        stripped.push('\n');
                        break;
                    }
                }
            },
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        stripped.push('\n');
                    }
                    previous = next;
                }
                stripped.push(' ');
            },
            _ => stripped.push(c),
        }
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_imports() {
        let content = r#"
syntax = "proto3";

package acme.weather.v1;

import "google/protobuf/timestamp.proto";
import public "acme/units/v1/units.proto";
import weak 'acme/legacy/v1/legacy.proto';
import "acme/units/v1/units.proto";
// import "commented/out.proto";
/* import "block/comment.proto";
   import "still/comment.proto"; */
option go_package = "example.com/weather//v1";

message Forecast {}
"#;
        let imports: Vec<String> = parse_imports(content).into_iter().collect();
        assert_eq!(imports, vec![
            "acme/legacy/v1/legacy.proto",
            "acme/units/v1/units.proto",
            "google/protobuf/timestamp.proto",
        ]);
    }

    #[test]
    fn test_imports_on_one_line() {
        let imports = parse_imports(r#"syntax = "proto3"; import "a.proto";import "b.proto";"#);
        assert_eq!(imports.len(), 2);
    }

    #[test]
    fn test_no_imports() {
        assert!(parse_imports("syntax = \"proto3\";\nmessage Foo {}\n").is_empty());
    }
}
