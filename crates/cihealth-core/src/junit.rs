//! JUnit XML parsing.
//!
//! Accepts either a single `<testsuite>` root or a `<testsuites>` wrapper;
//! test cases of every suite are flattened into one [`TestSuite`].
//! `<error>` elements are treated like `<failure>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{HealthError, HealthResult};
use crate::types::{Failure, TestCase, TestSuite};

/// Parse a JUnit document fetched from `url` (used for error context only).
pub fn parse_test_suite(url: &str, xml: &str) -> HealthResult<TestSuite> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut suite = TestSuite::default();
    let mut saw_suite = false;
    let mut current: Option<TestCase> = None;
    let mut failure: Option<Failure> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"testsuites" | b"testsuite" => {
                    saw_suite = true;
                    read_suite_attrs(url, e, &mut suite)?;
                }
                b"testcase" => current = Some(read_case(url, e)?),
                b"failure" | b"error" if current.is_some() => {
                    failure = Some(read_failure(url, e)?);
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"testsuites" | b"testsuite" => {
                    saw_suite = true;
                    read_suite_attrs(url, e, &mut suite)?;
                }
                b"testcase" => suite.test_cases.push(read_case(url, e)?),
                b"failure" | b"error" => {
                    if let Some(case) = current.as_mut() {
                        case.failure = Some(read_failure(url, e)?);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let Some(f) = failure.as_mut() {
                    let text = e.unescape().map_err(|err| HealthError::parse(url, err))?;
                    push_body(&mut f.body, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(f) = failure.as_mut() {
                    push_body(&mut f.body, &String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"failure" | b"error" => {
                    if let (Some(case), Some(f)) = (current.as_mut(), failure.take()) {
                        case.failure = Some(f);
                    }
                }
                b"testcase" => {
                    if let Some(case) = current.take() {
                        suite.test_cases.push(case);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HealthError::parse(
                    url,
                    format!("at byte {}: {e}", reader.buffer_position()),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_suite {
        return Err(HealthError::parse(url, "no <testsuite> element"));
    }
    Ok(suite)
}

fn attributes(url: &str, e: &BytesStart<'_>) -> HealthResult<Vec<(String, String)>> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| HealthError::parse(url, err))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| HealthError::parse(url, err))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn read_suite_attrs(url: &str, e: &BytesStart<'_>, suite: &mut TestSuite) -> HealthResult<()> {
    let is_wrapper = e.name().as_ref() == b"testsuites";
    for (key, value) in attributes(url, e)? {
        let count = || value.parse::<u64>().unwrap_or(0);
        match key.as_str() {
            "name" if suite.name.is_empty() => suite.name = value.clone(),
            // wrapper totals are recomputed from the nested suites
            "tests" if !is_wrapper => suite.tests += count(),
            "failures" if !is_wrapper => suite.failures += count(),
            "errors" if !is_wrapper => suite.errors += count(),
            "skipped" | "disabled" if !is_wrapper => suite.skipped += count(),
            _ => {}
        }
    }
    Ok(())
}

fn read_case(url: &str, e: &BytesStart<'_>) -> HealthResult<TestCase> {
    let mut case = TestCase::default();
    for (key, value) in attributes(url, e)? {
        match key.as_str() {
            "name" => case.name = value,
            "classname" => case.classname = value,
            "time" => case.time = value,
            _ => {}
        }
    }
    Ok(case)
}

fn read_failure(url: &str, e: &BytesStart<'_>) -> HealthResult<Failure> {
    let mut failure = Failure::default();
    for (key, value) in attributes(url, e)? {
        match key.as_str() {
            "message" => failure.message = value,
            "type" => failure.kind = value,
            _ => {}
        }
    }
    Ok(failure)
}

fn push_body(body: &mut String, text: &str) {
    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(text);
}
