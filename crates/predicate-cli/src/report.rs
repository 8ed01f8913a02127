//! Check and evaluation reports, as text or JSON.

use std::fmt::{self, Write};

use predicate_core::{
    Diagnostic, MergeGraph, Phase, PipelineSummary, QueryResult, Reporter, RootId, Value,
};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct RootReport {
    pub root: RootId,
    pub expression: String,
    pub origins: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub roots: Vec<RootReport>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PipelineSummary>,
}

impl CheckReport {
    /// Describes every root of a configured graph.
    pub fn new(
        graph: &MergeGraph,
        reporter: &Reporter,
        summary: Option<PipelineSummary>,
    ) -> Result<Self, CliError> {
        let roots = (0..graph.roots().len() as u32)
            .map(|index| -> Result<RootReport, CliError> {
                let root = RootId(index);
                let node = graph.root(root)?;
                Ok(RootReport {
                    root,
                    expression: graph.to_s(node)?.to_owned(),
                    origins: graph.origins(node).into_iter().map(str::to_owned).collect(),
                })
            })
            .collect::<Result<Vec<_>, CliError>>()?;
        Ok(CheckReport {
            roots,
            diagnostics: reporter.diagnostics().to_vec(),
            summary,
        })
    }

    pub fn write_text<W: Write>(&self, out: &mut W) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(out, "{diagnostic}")?;
        }
        for root in &self.roots {
            write!(out, "{}: {}", root.root.0, root.expression)?;
            if !root.origins.is_empty() {
                write!(out, "  # {}", root.origins.join(", "))?;
            }
            writeln!(out)?;
        }
        if let Some(summary) = &self.summary {
            writeln!(out, "{} sweep(s), {} node(s)", summary.sweeps, summary.nodes)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RootResult {
    pub root: RootId,
    #[serde(flatten)]
    pub result: QueryResult,
}

#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub phase: Option<Phase>,
    pub results: Vec<RootResult>,
}

#[derive(Debug, Default, Serialize)]
pub struct EvalReport {
    pub phases: Vec<PhaseReport>,
}

impl EvalReport {
    pub fn write_text<W: Write>(&self, out: &mut W) -> fmt::Result {
        for phase in &self.phases {
            match phase.phase {
                Some(p) => writeln!(out, "{p}:")?,
                None => writeln!(out, "phaseless:")?,
            }
            for entry in &phase.results {
                let state = if entry.result.finished {
                    "finished"
                } else {
                    "pending"
                };
                writeln!(
                    out,
                    "  {}: {} {state}",
                    entry.root.0,
                    render(&entry.result.values)
                )?;
            }
        }
        Ok(())
    }
}

fn render(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use predicate_core::{parse_expression, Environment, Pipeline};

    fn checked(lines: &[&str]) -> CheckReport {
        let factory = predicate_std::standard_factory();
        let mut graph = MergeGraph::new();
        for (i, line) in lines.iter().enumerate() {
            let node = parse_expression(line, &factory, &mut graph).unwrap();
            let root = graph.add_root(node).unwrap();
            graph
                .add_origin(graph.root(root).unwrap(), format!("rules.pred:{}", i + 1))
                .unwrap();
        }
        let mut reporter = Reporter::new();
        let summary = Pipeline::new(&factory, &Environment::new("test"))
            .run(&mut graph, &mut reporter)
            .unwrap();
        CheckReport::new(&graph, &reporter, Some(summary)).unwrap()
    }

    #[test]
    fn check_report_text() {
        let report = checked(&["(and (true) (var 'a'))", "(add 1 2)"]);
        let mut text = String::new();
        report.write_text(&mut text).unwrap();
        insta::assert_snapshot!(text.lines().take(2).collect::<Vec<_>>().join("\n"), @r"
        0: (var 'a')  # rules.pred:1
        1: 3  # rules.pred:2
        ");
    }

    #[test]
    fn check_report_json() {
        let report = checked(&["(or (var 'b') (var 'a'))"]);
        insta::assert_json_snapshot!(report.roots, @r#"
        [
          {
            "root": 0,
            "expression": "(or (var 'a') (var 'b'))",
            "origins": [
              "rules.pred:1"
            ]
          }
        ]
        "#);
    }

    #[test]
    fn eval_report() {
        let report = EvalReport {
            phases: vec![
                PhaseReport {
                    phase: Some(Phase(1)),
                    results: vec![RootResult {
                        root: RootId(0),
                        result: QueryResult {
                            values: vec![],
                            finished: false,
                        },
                    }],
                },
                PhaseReport {
                    phase: Some(Phase(2)),
                    results: vec![RootResult {
                        root: RootId(0),
                        result: QueryResult {
                            values: vec![Value::Number(1), Value::from("x")],
                            finished: true,
                        },
                    }],
                },
            ],
        };
        let mut text = String::new();
        report.write_text(&mut text).unwrap();
        insta::assert_snapshot!(text, @r"
        phase 1:
          0: [] pending
        phase 2:
          0: [1 'x'] finished
        ");
        insta::assert_json_snapshot!(report.phases[1], @r#"
        {
          "phase": 2,
          "results": [
            {
              "root": 0,
              "values": [
                1,
                "x"
              ],
              "finished": true
            }
          ]
        }
        "#);
    }
}
