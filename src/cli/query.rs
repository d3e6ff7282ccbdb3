use std::{
    fmt::Display,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Result;
use chrono::{DateTime, Duration, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::TryStreamExt;
use now::DateTimeNow;

use crate::{
    daemon::storage::record_storage::RecordStorageImpl,
    tracker::record::SessionRecord,
    utils::{
        dir::create_application_default_path,
        percentage::{duration_percentage, Percentage},
        time::{format_timestamp, next_day_start},
    },
};

use super::{
    input::read_records,
    output::{self, analysis::analyze_sites, extract_between},
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Range and location options shared by the query commands.
#[derive(Debug, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\". Defaults to a week ago"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Same formats as start. Defaults to now"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
    #[arg(
        long,
        help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

impl RangeArgs {
    pub fn application_dir(&self) -> Result<PathBuf> {
        self.dir
            .clone()
            .map_or_else(create_application_default_path, Ok)
    }
}

/// Output options shared by the query commands.
#[derive(Debug, clap::Args)]
pub struct OutputArgs {
    #[arg(long = "output-no-header", help = "Don't print the header line")]
    no_header: bool,
    #[arg(long, help = "Output file. Defaults to stdout")]
    output: Option<PathBuf>,
}

impl OutputArgs {
    fn writer(&self) -> Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordColumn {
    Url,
    Start,
    End,
    Active,
}

/// Options for reading a spreadsheet export instead of the local journal.
#[derive(Debug, clap::Args)]
pub struct InputArgs {
    #[arg(
        long,
        help = "Read tab separated records from this file instead of the local journal. Use - for stdin"
    )]
    input: Option<PathBuf>,
    #[arg(
        long = "input-columns",
        id = "input_columns",
        value_enum,
        value_delimiter = ',',
        default_value = "url,start,end",
        help = "Comma separated input columns"
    )]
    columns: Vec<RecordColumn>,
    #[arg(long = "input-no-header", id = "input_no_header", help = "Input has no header line")]
    no_header: bool,
}

impl InputArgs {
    fn reader(&self) -> Result<Option<Box<dyn BufRead>>> {
        Ok(match self.input.as_deref() {
            None => None,
            Some(path) if path.as_os_str() == "-" => Some(Box::new(io::stdin().lock())),
            Some(path) => Some(Box::new(BufReader::new(File::open(path)?))),
        })
    }
}

#[derive(Debug, Parser)]
pub struct FilterCommand {
    #[command(flatten)]
    pub range: RangeArgs,
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(
        long = "output-columns",
        value_enum,
        value_delimiter = ',',
        default_value = "url,start,end",
        help = "Comma separated output columns"
    )]
    columns: Vec<RecordColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SiteColumn {
    Site,
    Time,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    Site,
    Time,
}

#[derive(Debug, Parser)]
pub struct AggregateCommand {
    #[command(flatten)]
    pub range: RangeArgs,
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(
        long = "output-columns",
        value_enum,
        value_delimiter = ',',
        default_value = "site,time",
        help = "Comma separated output columns"
    )]
    columns: Vec<SiteColumn>,
    #[arg(long = "sort-by", value_enum, default_value_t = SortKey::Site)]
    sort_by: SortKey,
    #[arg(long, help = "Reverse output order")]
    reverse: bool,
    #[arg(
        long = "wall-clock",
        help = "Count the whole time a tab was open in front instead of the time the user was active"
    )]
    wall_clock: bool,
    #[arg(short = 'p', long = "percentage", help = "Filter sites to have at least specified percentage", default_value_t = Percentage::ZERO)]
    min_percentage: Percentage,
    #[arg(long, help = "Print durations like 1h2m3s instead of seconds")]
    human: bool,
}

const DEFAULT_RANGE_DAYS: i64 = 7;

/// Prints every record that started in the requested range.
pub async fn process_filter_command(dir: PathBuf, command: FilterCommand) -> Result<()> {
    let records = load_records(dir, &command.range, &command.input).await?;
    let mut writer = command.output.writer()?;
    write_records(&mut writer, &records, &command.columns, !command.output.no_header)?;
    writer.flush()?;
    Ok(())
}

/// Prints total time per site for records that started in the requested range.
pub async fn process_aggregate_command(dir: PathBuf, command: AggregateCommand) -> Result<()> {
    let records = load_records(dir, &command.range, &command.input).await?;
    let (mut usages, total) =
        analyze_sites(records, command.wall_clock, command.min_percentage);
    match command.sort_by {
        SortKey::Site => usages.sort_by(|a, b| a.site.cmp(&b.site)),
        SortKey::Time => usages.sort_by(|a, b| a.duration.cmp(&b.duration)),
    }
    if command.reverse {
        usages.reverse();
    }

    let mut writer = command.output.writer()?;
    if !command.output.no_header {
        writeln!(writer, "{}", header(&command.columns))?;
    }
    for usage in usages {
        let row = command
            .columns
            .iter()
            .map(|column| match column {
                SiteColumn::Site => usage.site.clone(),
                SiteColumn::Time if command.human => format_duration(usage.duration),
                SiteColumn::Time => usage.duration.num_seconds().to_string(),
                SiteColumn::Share => {
                    format!("{}%", *duration_percentage(usage.duration, total) as i32)
                }
            })
            .collect::<Vec<_>>();
        writeln!(writer, "{}", row.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads records that started in the range, either from an export or from the journal.
/// Exports are only limited by the bounds that were given explicitly.
async fn load_records(
    dir: PathBuf,
    range: &RangeArgs,
    input: &InputArgs,
) -> Result<Vec<SessionRecord>> {
    if let Some(reader) = input.reader()? {
        let (mut start, mut end) = parse_bounds(range)?;
        if range.treat_as_days {
            start = start.map(|v| v.beginning_of_day());
            end = end.map(next_day_start);
        }
        let (start, end) = (
            start.map(|v| v.with_timezone(&Utc)),
            end.map(|v| v.with_timezone(&Utc)),
        );
        let mut records = read_records(reader, &input.columns, !input.no_header)?;
        records.retain(|record| {
            start.map_or(true, |start| record.start >= start)
                && end.map_or(true, |end| record.start < end)
        });
        return Ok(records);
    }

    let (start, end) = parse_range(range)?;
    let storage = RecordStorageImpl::new(dir.join("records"))?;
    extract_between(
        storage,
        output::ExtractConfig {
            start: start.into(),
            end: end.into(),
        },
    )
    .try_collect()
    .await
}

fn write_records(
    writer: &mut impl Write,
    records: &[SessionRecord],
    columns: &[RecordColumn],
    with_header: bool,
) -> Result<()> {
    if with_header {
        writeln!(writer, "{}", header(columns))?;
    }
    for record in records {
        let row = columns
            .iter()
            .map(|column| match column {
                RecordColumn::Url => record.url.to_string(),
                RecordColumn::Start => format_timestamp(&record.start.with_timezone(&Local)),
                RecordColumn::End => format_timestamp(&record.end.with_timezone(&Local)),
                RecordColumn::Active => record.active_seconds().to_string(),
            })
            .collect::<Vec<_>>();
        writeln!(writer, "{}", row.join("\t"))?;
    }
    Ok(())
}

fn header<C: ValueEnum>(columns: &[C]) -> String {
    columns
        .iter()
        .filter_map(|v| v.to_possible_value())
        .map(|v| v.get_name().to_owned())
        .collect::<Vec<_>>()
        .join("\t")
}

/// Resolves the range, providing sensible defaults.
fn parse_range(range: &RangeArgs) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let (start, end) = parse_bounds(range)?;
    let mut start = start.unwrap_or(now - Duration::days(DEFAULT_RANGE_DAYS));
    let mut end = end.unwrap_or(now);
    if range.treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }
    Ok((start, end))
}

/// Parses the bounds that were given.
fn parse_bounds(range: &RangeArgs) -> Result<(Option<DateTime<Local>>, Option<DateTime<Local>>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = range.date_style.into();
    let parse = |value: &Option<String>, name: &str| -> Result<Option<DateTime<Local>>> {
        match value.as_ref().map(|s| parse_date_string(s, now, dialect)) {
            Some(Ok(v)) => Ok(Some(v.with_timezone(&Local))),
            Some(Err(e)) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to valiate {name} date {e}"),
                )
                .into()),
            None => Ok(None),
        }
    };
    Ok((parse(&range.start_date, "start")?, parse(&range.end_date, "end")?))
}

fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
