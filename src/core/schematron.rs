//! In-process ISO Schematron engine
//!
//! Schemas are compiled from their XML source into XPath 1.0 expressions and
//! run against a property document. The result is an SVRL report. Supported:
//! `ns`, `let` (schema, pattern and rule level), `pattern`, `rule` with
//! `extends`, abstract rules, `assert`, `report`, `value-of`, `name`.
//! Within a pattern nodes are visited in document order and each one is
//! handled by the first rule whose context matches it.

use std::collections::HashMap;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element, ParentOfChild};
use sxd_document::parser;
use sxd_xpath::nodeset::{Node, Nodeset};
use sxd_xpath::{Context, Factory, Value, XPath};

use crate::core::svrl::{normalized_text, Finding, SvrlEntry, SvrlReport};
use crate::error::ValidationEngineError;

pub const SCHEMATRON_NS: &str = "http://purl.oclc.org/dsdl/schematron";
const LEGACY_SCHEMATRON_NS: &str = "http://www.ascc.net/xml/schematron";
const MAX_EXTENDS_DEPTH: usize = 8;

/// Runs a schema against a data document and returns an SVRL report.
pub trait SchemaEngine: Send + Sync {
    fn validate(&self, schema_source: &str, data_xml: &str) -> Result<String, ValidationEngineError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchematronEngine;

impl SchematronEngine {
    pub fn new() -> Self {
        SchematronEngine
    }

    /// Same as [`SchemaEngine::validate`] but keeps the report structured.
    pub fn validate_report(&self, schema_source: &str, data_xml: &str) -> Result<SvrlReport, ValidationEngineError> {
        let schema = CompiledSchema::compile(schema_source)?;
        let package = parser::parse(data_xml).map_err(|e| ValidationEngineError::Data(format!("{:?}", e)))?;
        let document = package.as_document();
        schema.run(Node::Root(document.root()))
    }
}

impl SchemaEngine for SchematronEngine {
    fn validate(&self, schema_source: &str, data_xml: &str) -> Result<String, ValidationEngineError> {
        let report = self.validate_report(schema_source, data_xml)?;
        report
            .to_xml()
            .map_err(|e| ValidationEngineError::Evaluation(format!("could not write SVRL: {}", e)))
    }
}

struct CompiledLet {
    name: String,
    source: String,
    value: XPath,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CheckKind {
    Assert,
    Report,
}

enum MessagePart {
    Text(String),
    ValueOf(String, XPath),
    Name(Option<(String, XPath)>),
}

struct CompiledCheck {
    kind: CheckKind,
    id: Option<String>,
    role: Option<String>,
    test_source: String,
    test: XPath,
    message: Vec<MessagePart>,
}

struct CompiledRule {
    context_source: String,
    context: XPath,
    lets: Vec<CompiledLet>,
    checks: Vec<CompiledCheck>,
}

struct CompiledPattern {
    id: Option<String>,
    name: Option<String>,
    lets: Vec<CompiledLet>,
    rules: Vec<CompiledRule>,
}

struct CompiledSchema {
    title: Option<String>,
    namespaces: Vec<(String, String)>,
    lets: Vec<CompiledLet>,
    patterns: Vec<CompiledPattern>,
}

fn compile_error(message: impl Into<String>) -> ValidationEngineError {
    ValidationEngineError::Compile(message.into())
}

fn is_schematron(element: Element) -> bool {
    matches!(element.name().namespace_uri(), Some(SCHEMATRON_NS) | Some(LEGACY_SCHEMATRON_NS))
}

fn schematron_children(element: Element) -> Vec<Element> {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) if is_schematron(e) => Some(e),
            _ => None,
        })
        .collect()
}

fn required<'d>(element: Element<'d>, attribute: &str) -> Result<&'d str, ValidationEngineError> {
    element.attribute_value(attribute).ok_or_else(|| {
        compile_error(format!(
            "<{}> without '{}' attribute",
            element.name().local_part(),
            attribute
        ))
    })
}

fn compile_xpath(factory: &Factory, expression: &str) -> Result<XPath, ValidationEngineError> {
    factory
        .build(expression)
        .map_err(|e| compile_error(format!("invalid XPath '{}': {:?}", expression, e)))?
        .ok_or_else(|| compile_error(format!("empty XPath '{}'", expression)))
}

/// Turn a rule context into an expression evaluated from the document root.
fn context_expression(context: &str) -> String {
    split_union(context)
        .into_iter()
        .map(|alternative| {
            let alternative = alternative.trim();
            if alternative.starts_with('/') {
                alternative.to_string()
            } else {
                format!("//{}", alternative)
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Split at `|` outside of predicates, parentheses and string literals.
fn split_union(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, c) in expression.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                '|' if depth == 0 => {
                    parts.push(&expression[start..index]);
                    start = index + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&expression[start..]);
    parts
}

fn compile_let(factory: &Factory, element: Element) -> Result<CompiledLet, ValidationEngineError> {
    let name = required(element, "name")?;
    let source = required(element, "value")?;
    Ok(CompiledLet {
        name: name.to_string(),
        source: source.to_string(),
        value: compile_xpath(factory, source)?,
    })
}

fn compile_message(factory: &Factory, element: Element) -> Result<Vec<MessagePart>, ValidationEngineError> {
    let mut parts = Vec::new();
    for child in element.children() {
        match child {
            ChildOfElement::Text(text) => parts.push(MessagePart::Text(text.text().to_string())),
            ChildOfElement::Element(e) if is_schematron(e) && e.name().local_part() == "value-of" => {
                let select = required(e, "select")?;
                parts.push(MessagePart::ValueOf(select.to_string(), compile_xpath(factory, select)?));
            }
            ChildOfElement::Element(e) if is_schematron(e) && e.name().local_part() == "name" => {
                let path = match e.attribute_value("path") {
                    Some(path) => Some((path.to_string(), compile_xpath(factory, path)?)),
                    None => None,
                };
                parts.push(MessagePart::Name(path));
            }
            // emph, dir, span and foreign markup contribute their text
            ChildOfElement::Element(e) => parts.push(MessagePart::Text(format!(" {} ", normalized_text(e)))),
            _ => {}
        }
    }
    Ok(parts)
}

fn compile_check(factory: &Factory, element: Element, kind: CheckKind) -> Result<CompiledCheck, ValidationEngineError> {
    let test = required(element, "test")?;
    Ok(CompiledCheck {
        kind,
        id: element.attribute_value("id").map(str::to_string),
        role: element.attribute_value("role").map(str::to_string),
        test_source: test.to_string(),
        test: compile_xpath(factory, test)?,
        message: compile_message(factory, element)?,
    })
}

/// Collect the lets and checks of a rule body, following `extends`.
fn compile_rule_body(
    factory: &Factory,
    rule: Element,
    abstract_rules: &HashMap<String, Element>,
    depth: usize,
    lets: &mut Vec<CompiledLet>,
    checks: &mut Vec<CompiledCheck>,
) -> Result<(), ValidationEngineError> {
    if depth > MAX_EXTENDS_DEPTH {
        return Err(compile_error("rule extension nested too deeply"));
    }
    for child in schematron_children(rule) {
        match child.name().local_part() {
            "let" => lets.push(compile_let(factory, child)?),
            "assert" => checks.push(compile_check(factory, child, CheckKind::Assert)?),
            "report" => checks.push(compile_check(factory, child, CheckKind::Report)?),
            "extends" => {
                let id = required(child, "rule")?;
                let base = abstract_rules
                    .get(id)
                    .ok_or_else(|| compile_error(format!("unknown abstract rule '{}'", id)))?;
                compile_rule_body(factory, *base, abstract_rules, depth + 1, lets, checks)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_abstract(element: Element) -> bool {
    element.attribute_value("abstract") == Some("true")
}

impl CompiledSchema {
    fn compile(source: &str) -> Result<Self, ValidationEngineError> {
        let package = parser::parse(source).map_err(|e| compile_error(format!("{:?}", e)))?;
        let document = package.as_document();

        let root = document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(element) => Some(element),
                _ => None,
            })
            .ok_or_else(|| compile_error("empty schema document"))?;
        if !is_schematron(root) || root.name().local_part() != "schema" {
            return Err(compile_error(format!(
                "root element <{}> is not a Schematron schema",
                root.name().local_part()
            )));
        }

        let top_level = schematron_children(root);

        let mut abstract_rules = HashMap::new();
        for pattern in top_level.iter().filter(|e| e.name().local_part() == "pattern") {
            for rule in schematron_children(*pattern) {
                if rule.name().local_part() == "rule" && is_abstract(rule) {
                    abstract_rules.insert(required(rule, "id")?.to_string(), rule);
                }
            }
        }

        let factory = Factory::new();
        let mut schema = CompiledSchema {
            title: None,
            namespaces: Vec::new(),
            lets: Vec::new(),
            patterns: Vec::new(),
        };

        for element in top_level {
            match element.name().local_part() {
                "title" => schema.title = Some(normalized_text(element)),
                "ns" => schema.namespaces.push((
                    required(element, "prefix")?.to_string(),
                    required(element, "uri")?.to_string(),
                )),
                "let" => schema.lets.push(compile_let(&factory, element)?),
                "pattern" if is_abstract(element) => {}
                "pattern" if element.attribute_value("is-a").is_some() => {
                    return Err(compile_error("abstract pattern instances are not supported"));
                }
                "pattern" => schema.patterns.push(compile_pattern(&factory, element, &abstract_rules)?),
                "include" => return Err(compile_error("<include> is not supported")),
                _ => {}
            }
        }

        Ok(schema)
    }

    fn run<'d>(&self, root: Node<'d>) -> Result<SvrlReport, ValidationEngineError> {
        let mut report = SvrlReport {
            title: self.title.clone(),
            entries: Vec::new(),
        };

        let mut global = Vec::new();
        self.bind(&self.lets, root, &mut global)?;

        for pattern in &self.patterns {
            report.entries.push(SvrlEntry::ActivePattern {
                id: pattern.id.clone(),
                name: pattern.name.clone(),
            });

            let mut pattern_variables = global.clone();
            self.bind(&pattern.lets, root, &mut pattern_variables)?;

            let pattern_context = self.context(&pattern_variables);
            let mut selections: Vec<Vec<Node<'d>>> = Vec::with_capacity(pattern.rules.len());
            let mut candidates = Nodeset::new();
            for rule in &pattern.rules {
                let nodes = match rule
                    .context
                    .evaluate(&pattern_context, root)
                    .map_err(|e| evaluation_error(&rule.context_source, e))?
                {
                    Value::Nodeset(nodes) => nodes.document_order(),
                    _ => {
                        return Err(ValidationEngineError::Evaluation(format!(
                            "rule context '{}' does not select nodes",
                            rule.context_source
                        )))
                    }
                };
                for node in &nodes {
                    candidates.add(*node);
                }
                selections.push(nodes);
            }

            for node in candidates.document_order() {
                let rule = match pattern
                    .rules
                    .iter()
                    .zip(&selections)
                    .find(|(_, selected)| selected.contains(&node))
                {
                    Some((rule, _)) => rule,
                    None => continue,
                };
                report.entries.push(SvrlEntry::FiredRule {
                    context: rule.context_source.clone(),
                });

                let mut rule_variables = pattern_variables.clone();
                self.bind(&rule.lets, node, &mut rule_variables)?;
                let context = self.context(&rule_variables);

                for check in &rule.checks {
                    let result = check
                        .test
                        .evaluate(&context, node)
                        .map_err(|e| evaluation_error(&check.test_source, e))?
                        .boolean();
                    let fires = match check.kind {
                        CheckKind::Assert => !result,
                        CheckKind::Report => result,
                    };
                    if !fires {
                        continue;
                    }

                    let finding = Finding {
                        test: check.test_source.clone(),
                        location: location(node),
                        id: check.id.clone(),
                        role: check.role.clone(),
                        text: self.message(&check.message, &context, node)?,
                    };
                    report.entries.push(match check.kind {
                        CheckKind::Assert => SvrlEntry::FailedAssert(finding),
                        CheckKind::Report => SvrlEntry::SuccessfulReport(finding),
                    });
                }
            }
        }

        Ok(report)
    }

    fn context<'d>(&self, variables: &[(String, Value<'d>)]) -> Context<'d> {
        let mut context = Context::new();
        for (prefix, uri) in &self.namespaces {
            context.set_namespace(prefix, uri);
        }
        for (name, value) in variables {
            context.set_variable(name.as_str(), value.clone());
        }
        context
    }

    /// Evaluate `lets` in order, each one seeing the ones before it.
    fn bind<'d>(
        &self,
        lets: &[CompiledLet],
        node: Node<'d>,
        variables: &mut Vec<(String, Value<'d>)>,
    ) -> Result<(), ValidationEngineError> {
        for binding in lets {
            let value = binding
                .value
                .evaluate(&self.context(variables), node)
                .map_err(|e| evaluation_error(&binding.source, e))?;
            variables.push((binding.name.clone(), value));
        }
        Ok(())
    }

    fn message<'d>(
        &self,
        parts: &[MessagePart],
        context: &Context<'d>,
        node: Node<'d>,
    ) -> Result<String, ValidationEngineError> {
        let mut text = String::new();
        for part in parts {
            match part {
                MessagePart::Text(t) => text.push_str(t),
                MessagePart::ValueOf(source, select) => {
                    let value = select.evaluate(context, node).map_err(|e| evaluation_error(source, e))?;
                    text.push_str(&value.string());
                }
                MessagePart::Name(None) => text.push_str(&node_name(node)),
                MessagePart::Name(Some((source, path))) => {
                    if let Value::Nodeset(nodes) = path.evaluate(context, node).map_err(|e| evaluation_error(source, e))? {
                        if let Some(first) = nodes.document_order().first() {
                            text.push_str(&node_name(*first));
                        }
                    }
                }
            }
        }
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

fn compile_pattern(
    factory: &Factory,
    element: Element,
    abstract_rules: &HashMap<String, Element>,
) -> Result<CompiledPattern, ValidationEngineError> {
    let mut pattern = CompiledPattern {
        id: element.attribute_value("id").map(str::to_string),
        name: element.attribute_value("name").map(str::to_string),
        lets: Vec::new(),
        rules: Vec::new(),
    };

    for child in schematron_children(element) {
        match child.name().local_part() {
            "title" if pattern.name.is_none() => pattern.name = Some(normalized_text(child)),
            "let" => pattern.lets.push(compile_let(factory, child)?),
            "rule" if is_abstract(child) => {}
            "rule" => {
                let context_source = required(child, "context")?;
                let mut lets = Vec::new();
                let mut checks = Vec::new();
                compile_rule_body(factory, child, abstract_rules, 0, &mut lets, &mut checks)?;
                pattern.rules.push(CompiledRule {
                    context_source: context_source.to_string(),
                    context: compile_xpath(factory, &context_expression(context_source))?,
                    lets,
                    checks,
                });
            }
            _ => {}
        }
    }

    Ok(pattern)
}

fn evaluation_error(expression: &str, error: impl std::fmt::Debug) -> ValidationEngineError {
    ValidationEngineError::Evaluation(format!("'{}': {:?}", expression, error))
}

fn node_name(node: Node) -> String {
    match node {
        Node::Element(element) => element.name().local_part().to_string(),
        Node::Attribute(attribute) => attribute.name().local_part().to_string(),
        _ => String::new(),
    }
}

/// XPath location of a node, e.g. `/properties[1]/pages[1]/page[2]`.
fn location(node: Node) -> String {
    match node {
        Node::Root(_) => "/".to_string(),
        Node::Element(element) => element_location(element),
        Node::Attribute(attribute) => match attribute.parent() {
            Some(parent) => format!("{}/@{}", element_location(parent), attribute.name().local_part()),
            None => format!("@{}", attribute.name().local_part()),
        },
        Node::Text(text) => text
            .parent()
            .map(|parent| format!("{}/text()", element_location(parent)))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn element_location(element: Element) -> String {
    let mut steps = Vec::new();
    let mut current = Some(element);

    while let Some(e) = current {
        let name = e.name().local_part();
        match e.parent() {
            Some(ParentOfChild::Element(parent)) => {
                let position = parent
                    .children()
                    .into_iter()
                    .filter_map(|child| match child {
                        ChildOfElement::Element(sibling) if sibling.name().local_part() == name => Some(sibling),
                        _ => None,
                    })
                    .position(|sibling| sibling == e)
                    .map_or(1, |p| p + 1);
                steps.push(format!("{}[{}]", name, position));
                current = Some(parent);
            }
            _ => {
                steps.push(format!("{}[1]", name));
                current = None;
            }
        }
    }

    steps.reverse();
    format!("/{}", steps.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<properties>
  <filePath>/batch/a.pdf</filePath>
  <noPages>2</noPages>
  <pages>
    <page number="1"><image><stream><format>JPEG</format><JPEGQuality>85</JPEGQuality></stream></image></page>
    <page number="2"><image><stream><format>JPEG</format><JPEGQuality>50</JPEGQuality></stream></image></page>
  </pages>
</properties>"#;

    fn schema(body: &str) -> String {
        format!(
            r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron" queryBinding="xslt">{}</sch:schema>"#,
            body
        )
    }

    fn run(body: &str) -> SvrlReport {
        SchematronEngine::new().validate_report(&schema(body), DATA).unwrap()
    }

    #[test]
    fn test_assert_fails_per_context_node() {
        let report = run(r#"<sch:pattern><sch:rule context="//stream">
            <sch:assert test="JPEGQuality = 85">quality is <sch:value-of select="JPEGQuality"/>, expected 85</sch:assert>
        </sch:rule></sch:pattern>"#);

        let failed: Vec<_> = report.failed_asserts().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].test, "JPEGQuality = 85");
        assert_eq!(failed[0].text, "quality is 50, expected 85");
        assert_eq!(failed[0].location, "/properties[1]/pages[1]/page[2]/image[1]/stream[1]");
    }

    #[test]
    fn test_passing_schema_has_no_failures() {
        let report = run(r#"<sch:pattern id="pages"><sch:rule context="properties">
            <sch:assert test="noPages = count(pages/page)">page count mismatch</sch:assert>
        </sch:rule></sch:pattern>"#);
        assert_eq!(report.failed_asserts().count(), 0);
        assert!(report.entries.contains(&SvrlEntry::ActivePattern {
            id: Some("pages".to_string()),
            name: None
        }));
        assert!(report.entries.contains(&SvrlEntry::FiredRule {
            context: "properties".to_string()
        }));
    }

    #[test]
    fn test_report_fires_when_true() {
        let report = run(r#"<sch:pattern><sch:rule context="/properties">
            <sch:report test="noPages &gt; 1">multi-page: <sch:name/></sch:report>
        </sch:rule></sch:pattern>"#);
        let reports: Vec<_> = report
            .entries
            .iter()
            .filter_map(|e| match e {
                SvrlEntry::SuccessfulReport(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].text, "multi-page: properties");
    }

    #[test]
    fn test_first_rule_claims_node_within_pattern() {
        let report = run(r#"<sch:pattern>
            <sch:rule context="page[@number = '1']"><sch:assert test="true()">x</sch:assert></sch:rule>
            <sch:rule context="page"><sch:assert test="@number = '1'">only page 1 expected</sch:assert></sch:rule>
        </sch:pattern>"#);
        let failed: Vec<_> = report.failed_asserts().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].location, "/properties[1]/pages[1]/page[2]");
    }

    #[test]
    fn test_nodes_are_visited_in_document_order_across_rules() {
        let report = run(r#"<sch:pattern>
            <sch:rule context="page[@number = '2']"><sch:assert test="1 = 2">second page</sch:assert></sch:rule>
            <sch:rule context="filePath"><sch:assert test="2 = 3">file path</sch:assert></sch:rule>
        </sch:pattern>"#);
        let failed: Vec<_> = report.failed_asserts().map(|f| f.text.as_str()).collect();
        assert_eq!(failed, vec!["file path", "second page"]);

        let fired: Vec<_> = report
            .entries
            .iter()
            .filter_map(|e| match e {
                SvrlEntry::FiredRule { context } => Some(context.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec!["filePath", "page[@number = '2']"]);
    }

    #[test]
    fn test_lets_and_extends() {
        let report = run(r#"
            <sch:let name="minimum" value="60"/>
            <sch:pattern>
              <sch:rule abstract="true" id="jpeg"><sch:assert test="format = 'JPEG'">not JPEG</sch:assert></sch:rule>
              <sch:rule context="stream">
                <sch:let name="q" value="number(JPEGQuality)"/>
                <sch:extends rule="jpeg"/>
                <sch:assert test="$q &gt;= $minimum">quality <sch:value-of select="$q"/> below <sch:value-of select="$minimum"/></sch:assert>
              </sch:rule>
            </sch:pattern>"#);
        let failed: Vec<_> = report.failed_asserts().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].text, "quality 50 below 60");
    }

    #[test]
    fn test_union_context() {
        assert_eq!(context_expression("filePath | /properties/noPages"), "//filePath | /properties/noPages");
        assert_eq!(split_union("a[b|c] | d").len(), 2);
        assert_eq!(split_union("a['|']").len(), 1);
    }

    #[test]
    fn test_invalid_xpath_is_compile_error() {
        let err = SchematronEngine::new()
            .validate_report(
                &schema(r#"<sch:pattern><sch:rule context="stream"><sch:assert test="((">x</sch:assert></sch:rule></sch:pattern>"#),
                DATA,
            )
            .unwrap_err();
        assert!(matches!(err, ValidationEngineError::Compile(_)));
    }

    #[test]
    fn test_empty_expression_is_compile_error() {
        for body in [
            r#"<sch:pattern><sch:rule context="stream"><sch:assert test="">x</sch:assert></sch:rule></sch:pattern>"#,
            r#"<sch:pattern><sch:rule context=""><sch:assert test="true()">x</sch:assert></sch:rule></sch:pattern>"#,
        ] {
            let err = SchematronEngine::new().validate_report(&schema(body), DATA).unwrap_err();
            assert!(matches!(err, ValidationEngineError::Compile(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_non_schematron_root_is_compile_error() {
        let err = SchematronEngine::new().validate_report("<schema/>", DATA).unwrap_err();
        assert!(matches!(err, ValidationEngineError::Compile(_)));
    }

    #[test]
    fn test_malformed_data_document() {
        let err = SchematronEngine::new()
            .validate_report(&schema("<sch:pattern/>"), "<properties>")
            .unwrap_err();
        assert!(matches!(err, ValidationEngineError::Data(_)));
    }

    #[test]
    fn test_engine_returns_svrl_text() {
        let svrl = SchematronEngine::new()
            .validate(
                &schema(r#"<sch:pattern><sch:rule context="noPages"><sch:assert test=". = 3">three pages</sch:assert></sch:rule></sch:pattern>"#),
                DATA,
            )
            .unwrap();
        let report = SvrlReport::parse(&svrl).unwrap();
        assert_eq!(report.failed_asserts().count(), 1);
    }
}
