use std::io::Write as _;

use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};

use staffdb_core::types::{Employee, NewEmployee, PayrollRecord, SortOrder};

use crate::adjustment::AdjustmentService;
use crate::lifecycle::LifecycleService;
use crate::report::ReportService;

/// One entry of the console's finite command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Every command the console understands. `help` renders this table; parsing
/// dispatches against it, so the two can never drift apart.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "add",
        usage: "add <first> <last> <ssn> <email> <division-id> <job-title-id>",
        summary: "create an employee with its division and job-title assignment",
    },
    CommandSpec {
        name: "find",
        usage: "find <employee-id>",
        summary: "look up an employee by id",
    },
    CommandSpec {
        name: "find-ssn",
        usage: "find-ssn <ssn>",
        summary: "look up an employee by its 9-digit ssn",
    },
    CommandSpec {
        name: "search",
        usage: "search <name-fragment>",
        summary: "substring search on first or last name (wildcards match literally)",
    },
    CommandSpec {
        name: "update",
        usage: "update <employee-id> <first> <last> <ssn> <email> <division-id> <job-title-id>",
        summary: "replace an employee's fields and both assignments",
    },
    CommandSpec {
        name: "delete",
        usage: "delete <employee-id>",
        summary: "delete the employee row (assignments and payroll are kept)",
    },
    CommandSpec {
        name: "raise",
        usage: "raise <min> <max> <percent>",
        summary: "raise all payroll amounts within [min, max] by the percentage",
    },
    CommandSpec {
        name: "history",
        usage: "history <employee-id> [asc|desc]",
        summary: "print an employee's payroll history",
    },
    CommandSpec {
        name: "export",
        usage: "export <employee-id>",
        summary: "dump an employee with assignments and pay history as JSON",
    },
    CommandSpec {
        name: "report-division",
        usage: "report-division <year> <month>",
        summary: "total pay per current division for the month",
    },
    CommandSpec {
        name: "report-title",
        usage: "report-title <year> <month>",
        summary: "total pay per current job title for the month",
    },
    CommandSpec {
        name: "divisions",
        usage: "divisions",
        summary: "list all divisions",
    },
    CommandSpec {
        name: "titles",
        usage: "titles",
        summary: "list all job titles",
    },
    CommandSpec {
        name: "add-division",
        usage: "add-division <name>",
        summary: "create a division",
    },
    CommandSpec {
        name: "add-title",
        usage: "add-title <title>",
        summary: "create a job title",
    },
    CommandSpec {
        name: "help",
        usage: "help",
        summary: "show this table",
    },
    CommandSpec {
        name: "quit",
        usage: "quit",
        summary: "exit the console",
    },
];

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        first: String,
        last: String,
        ssn: String,
        email: String,
        division_id: i64,
        job_title_id: i64,
    },
    Find {
        employee_id: i64,
    },
    FindSsn {
        ssn: String,
    },
    Search {
        fragment: String,
    },
    Update {
        employee_id: i64,
        first: String,
        last: String,
        ssn: String,
        email: String,
        division_id: i64,
        job_title_id: i64,
    },
    Delete {
        employee_id: i64,
    },
    Raise {
        min: Decimal,
        max: Decimal,
        percent: Decimal,
    },
    History {
        employee_id: i64,
        order: SortOrder,
    },
    Export {
        employee_id: i64,
    },
    ReportDivision {
        year: i32,
        month: u32,
    },
    ReportTitle {
        year: i32,
        month: u32,
    },
    Divisions,
    Titles,
    AddDivision {
        name: String,
    },
    AddTitle {
        title: String,
    },
    Help,
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum ParseError {
    Empty,
    Unknown(String),
    Usage(&'static str),
}

impl Command {
    /// Parses one console line. Pure, so the whole table is unit-testable.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            return Err(ParseError::Empty);
        };
        let args: Vec<&str> = tokens.collect();

        match name {
            "add" => {
                let [first, last, ssn, email, division, title] = args[..] else {
                    return Err(usage("add"));
                };
                Ok(Self::Add {
                    first: first.to_string(),
                    last: last.to_string(),
                    ssn: ssn.to_string(),
                    email: email.to_string(),
                    division_id: parse_arg(division, "add")?,
                    job_title_id: parse_arg(title, "add")?,
                })
            }
            "find" => {
                let [id] = args[..] else {
                    return Err(usage("find"));
                };
                Ok(Self::Find {
                    employee_id: parse_arg(id, "find")?,
                })
            }
            "find-ssn" => {
                let [ssn] = args[..] else {
                    return Err(usage("find-ssn"));
                };
                Ok(Self::FindSsn {
                    ssn: ssn.to_string(),
                })
            }
            "search" => {
                if args.is_empty() {
                    return Err(usage("search"));
                }
                Ok(Self::Search {
                    fragment: args.join(" "),
                })
            }
            "update" => {
                let [id, first, last, ssn, email, division, title] = args[..] else {
                    return Err(usage("update"));
                };
                Ok(Self::Update {
                    employee_id: parse_arg(id, "update")?,
                    first: first.to_string(),
                    last: last.to_string(),
                    ssn: ssn.to_string(),
                    email: email.to_string(),
                    division_id: parse_arg(division, "update")?,
                    job_title_id: parse_arg(title, "update")?,
                })
            }
            "delete" => {
                let [id] = args[..] else {
                    return Err(usage("delete"));
                };
                Ok(Self::Delete {
                    employee_id: parse_arg(id, "delete")?,
                })
            }
            "raise" => {
                let [min, max, percent] = args[..] else {
                    return Err(usage("raise"));
                };
                Ok(Self::Raise {
                    min: parse_arg(min, "raise")?,
                    max: parse_arg(max, "raise")?,
                    percent: parse_arg(percent, "raise")?,
                })
            }
            "history" => {
                let (id, order) = match args[..] {
                    [id] => (id, SortOrder::Ascending),
                    [id, "asc"] => (id, SortOrder::Ascending),
                    [id, "desc"] => (id, SortOrder::Descending),
                    _ => return Err(usage("history")),
                };
                Ok(Self::History {
                    employee_id: parse_arg(id, "history")?,
                    order,
                })
            }
            "export" => {
                let [id] = args[..] else {
                    return Err(usage("export"));
                };
                Ok(Self::Export {
                    employee_id: parse_arg(id, "export")?,
                })
            }
            "report-division" => {
                let [year, month] = args[..] else {
                    return Err(usage("report-division"));
                };
                Ok(Self::ReportDivision {
                    year: parse_arg(year, "report-division")?,
                    month: parse_arg(month, "report-division")?,
                })
            }
            "report-title" => {
                let [year, month] = args[..] else {
                    return Err(usage("report-title"));
                };
                Ok(Self::ReportTitle {
                    year: parse_arg(year, "report-title")?,
                    month: parse_arg(month, "report-title")?,
                })
            }
            "divisions" => Ok(Self::Divisions),
            "titles" => Ok(Self::Titles),
            "add-division" => {
                if args.is_empty() {
                    return Err(usage("add-division"));
                }
                Ok(Self::AddDivision {
                    name: args.join(" "),
                })
            }
            "add-title" => {
                if args.is_empty() {
                    return Err(usage("add-title"));
                }
                Ok(Self::AddTitle {
                    title: args.join(" "),
                })
            }
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn usage(name: &'static str) -> ParseError {
    let spec = COMMANDS
        .iter()
        .find(|spec| spec.name == name)
        .unwrap_or(&COMMANDS[0]);
    ParseError::Usage(spec.usage)
}

fn parse_arg<T: std::str::FromStr>(value: &str, command: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| usage(command))
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run(
    lifecycle: LifecycleService,
    adjustment: AdjustmentService,
    reports: ReportService,
) -> std::io::Result<()> {
    println!("staffdb console - type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match Command::parse(&line) {
            Err(ParseError::Empty) => continue,
            Err(ParseError::Unknown(name)) => {
                println!("unknown command '{name}', try 'help'");
            }
            Err(ParseError::Usage(usage)) => println!("usage: {usage}"),
            Ok(Command::Quit) => break,
            Ok(command) => dispatch(command, &lifecycle, &adjustment, &reports).await,
        }
    }
    Ok(())
}

async fn dispatch(
    command: Command,
    lifecycle: &LifecycleService,
    adjustment: &AdjustmentService,
    reports: &ReportService,
) {
    match command {
        Command::Add {
            first,
            last,
            ssn,
            email,
            division_id,
            job_title_id,
        } => {
            let fields = match NewEmployee::new(first, last, ssn, email) {
                Ok(fields) => fields,
                Err(err) => {
                    println!("error: {err}");
                    return;
                }
            };
            match lifecycle.add(fields, division_id, job_title_id).await {
                Ok(employee) => {
                    println!("created employee {}", employee.employee_id);
                    print_employee(&employee);
                }
                Err(err) => println!("error: {err}"),
            }
        }
        Command::Find { employee_id } => match lifecycle.find_by_id(employee_id).await {
            Ok(Some(employee)) => print_employee(&employee),
            Ok(None) => println!("no employee with id {employee_id}"),
            Err(err) => println!("error: {err}"),
        },
        Command::FindSsn { ssn } => match lifecycle.find_by_ssn(&ssn).await {
            Ok(Some(employee)) => print_employee(&employee),
            Ok(None) => println!("no employee with ssn {ssn}"),
            Err(err) => println!("error: {err}"),
        },
        Command::Search { fragment } => match lifecycle.search_by_name(&fragment).await {
            Ok(hits) if hits.is_empty() => println!("no matches"),
            Ok(hits) => {
                println!("{} match(es)", hits.len());
                for employee in &hits {
                    print_employee(employee);
                }
            }
            Err(err) => println!("error: {err}"),
        },
        Command::Update {
            employee_id,
            first,
            last,
            ssn,
            email,
            division_id,
            job_title_id,
        } => {
            let fields = match NewEmployee::new(first, last, ssn, email) {
                Ok(fields) => fields,
                Err(err) => {
                    println!("error: {err}");
                    return;
                }
            };
            match lifecycle
                .update(Some(employee_id), &fields, division_id, job_title_id)
                .await
            {
                Ok(true) => println!("updated employee {employee_id}"),
                Ok(false) => println!("no employee with id {employee_id}"),
                Err(err) => println!("error: {err}"),
            }
        }
        Command::Delete { employee_id } => match lifecycle.delete(employee_id).await {
            Ok(true) => println!("deleted employee {employee_id}"),
            Ok(false) => println!("no employee with id {employee_id}"),
            Err(err) => println!("error: {err}"),
        },
        Command::Raise { min, max, percent } => {
            match adjustment.increase_in_range(min, max, percent).await {
                Ok(count) => println!(
                    "{count} payroll row(s) affected ({} policy)",
                    adjustment.policy().as_str()
                ),
                Err(err) => println!("error: {err}"),
            }
        }
        Command::History { employee_id, order } => {
            match reports.pay_history(employee_id, order).await {
                Ok(rows) if rows.is_empty() => println!("no payroll rows for {employee_id}"),
                Ok(rows) => {
                    for row in &rows {
                        print_payroll(row);
                    }
                }
                Err(err) => println!("error: {err}"),
            }
        }
        Command::Export { employee_id } => {
            match reports.employee_with_history(employee_id).await {
                Ok(Some(report)) => match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(err) => println!("error: {err}"),
                },
                Ok(None) => println!("no employee with id {employee_id}"),
                Err(err) => println!("error: {err}"),
            }
        }
        Command::ReportDivision { year, month } => {
            match reports.total_pay_by_division(year, month).await {
                Ok(totals) if totals.is_empty() => println!("no payroll for {year}-{month:02}"),
                Ok(totals) => {
                    for (name, total) in &totals {
                        println!("{name}: {total}");
                    }
                }
                Err(err) => println!("error: {err}"),
            }
        }
        Command::ReportTitle { year, month } => {
            match reports.total_pay_by_job_title(year, month).await {
                Ok(totals) if totals.is_empty() => println!("no payroll for {year}-{month:02}"),
                Ok(totals) => {
                    for (name, total) in &totals {
                        println!("{name}: {total}");
                    }
                }
                Err(err) => println!("error: {err}"),
            }
        }
        Command::Divisions => match lifecycle.divisions().await {
            Ok(divisions) => {
                for division in &divisions {
                    println!("{}: {}", division.division_id, division.name);
                }
            }
            Err(err) => println!("error: {err}"),
        },
        Command::Titles => match lifecycle.job_titles().await {
            Ok(titles) => {
                for title in &titles {
                    println!("{}: {}", title.job_title_id, title.title);
                }
            }
            Err(err) => println!("error: {err}"),
        },
        Command::AddDivision { name } => match lifecycle.add_division(&name).await {
            Ok(division) => println!("created division {}", division.division_id),
            Err(err) => println!("error: {err}"),
        },
        Command::AddTitle { title } => match lifecycle.add_job_title(&title).await {
            Ok(job_title) => println!("created job title {}", job_title.job_title_id),
            Err(err) => println!("error: {err}"),
        },
        Command::Help => print_help(),
        Command::Quit => {}
    }
}

fn print_help() {
    let width = COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    for spec in COMMANDS {
        println!("  {:<width$}  {}", spec.usage, spec.summary);
    }
}

fn print_employee(employee: &Employee) {
    println!(
        "#{} {} {} | ssn {} | {} | division {} | job title {}",
        employee.employee_id,
        employee.first_name,
        employee.last_name,
        employee.ssn,
        employee.email,
        employee
            .division_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        employee
            .job_title_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
    );
}

fn print_payroll(record: &PayrollRecord) {
    println!(
        "#{} {} .. {} | {}",
        record.payroll_id, record.period_start, record.period_end, record.amount
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn every_table_entry_parses_to_a_command() {
        // Each command name must be reachable through the parser; this keeps
        // the table and the dispatcher in sync.
        let samples = [
            "add Ada Lovelace 123456789 ada@example.com 1 2",
            "find 7",
            "find-ssn 123456789",
            "search lovel",
            "update 7 Ada Lovelace 123456789 ada@example.com 1 2",
            "delete 7",
            "raise 1000 2000 3.2",
            "history 7",
            "export 7",
            "report-division 2025 6",
            "report-title 2025 6",
            "divisions",
            "titles",
            "add-division Customer Success",
            "add-title Staff Engineer",
            "help",
            "quit",
        ];
        for (spec, sample) in COMMANDS.iter().zip(samples) {
            assert!(
                sample.starts_with(spec.name),
                "sample order must match table order"
            );
            Command::parse(sample).unwrap_or_else(|err| panic!("{sample}: {err:?}"));
        }
        assert_eq!(samples.len(), COMMANDS.len());
    }

    #[test]
    fn parses_add_fields() {
        let command = Command::parse("add Ada Lovelace 123456789 ada@example.com 1 2").unwrap();
        assert_eq!(
            command,
            Command::Add {
                first: "Ada".into(),
                last: "Lovelace".into(),
                ssn: "123456789".into(),
                email: "ada@example.com".into(),
                division_id: 1,
                job_title_id: 2,
            }
        );
    }

    #[test]
    fn parses_raise_decimals() {
        let command = Command::parse("raise 1000.50 2000 3.2").unwrap();
        assert_eq!(
            command,
            Command::Raise {
                min: dec("1000.50"),
                max: dec("2000"),
                percent: dec("3.2"),
            }
        );
    }

    #[test]
    fn history_defaults_to_ascending() {
        assert_eq!(
            Command::parse("history 7").unwrap(),
            Command::History {
                employee_id: 7,
                order: SortOrder::Ascending,
            }
        );
        assert_eq!(
            Command::parse("history 7 desc").unwrap(),
            Command::History {
                employee_id: 7,
                order: SortOrder::Descending,
            }
        );
    }

    #[test]
    fn search_joins_multi_word_fragments() {
        assert_eq!(
            Command::parse("search van der Berg").unwrap(),
            Command::Search {
                fragment: "van der Berg".into(),
            }
        );
    }

    #[test]
    fn wrong_arity_reports_usage() {
        let err = Command::parse("add Ada Lovelace").unwrap_err();
        assert!(matches!(err, ParseError::Usage(usage) if usage.starts_with("add ")));
    }

    #[test]
    fn non_numeric_id_reports_usage() {
        let err = Command::parse("find seven").unwrap_err();
        assert!(matches!(err, ParseError::Usage(_)));
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = Command::parse("launch").unwrap_err();
        assert_eq!(err, ParseError::Unknown("launch".into()));
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(Command::parse("   ").unwrap_err(), ParseError::Empty);
    }
}
