/// Source name constants to ensure consistency across the codebase.
/// These double as the stem of each source's output document.
pub const GENERAL_SOURCE: &str = "general";
pub const STATE_FARM_SOURCE: &str = "state_farm";
pub const ATHLETICS_SOURCE: &str = "athletic";

// Sentinels written into events when nothing could be parsed
pub const UNKNOWN_DATE: &str = "N/A";
pub const ALL_DAY_START: &str = "12:00 AM";
pub const ALL_DAY_END: &str = "11:59 PM";
pub const UNKNOWN_TITLE: &str = "Unknown Event";
pub const NO_DESCRIPTION: &str = "N/A";

/// Fixed offset applied when rendering date-times for publication (US Central, standard time).
pub const PUBLISH_OFFSET_SECS: i32 = -6 * 60 * 60;

// General calendar
pub const GENERAL_CALENDAR_LINKS: [&str; 10] = [
    "https://calendars.illinois.edu/list/7",
    "https://calendars.illinois.edu/list/557",
    "https://calendars.illinois.edu/list/594",
    "https://calendars.illinois.edu/list/4756",
    "https://calendars.illinois.edu/list/596",
    "https://calendars.illinois.edu/list/62",
    "https://calendars.illinois.edu/list/597",
    "https://calendars.illinois.edu/list/637",
    "https://calendars.illinois.edu/list/4757",
    "https://calendars.illinois.edu/list/598",
];
pub const GENERAL_EVENT_ID_PARAM: &str = "eventId";

// State Farm Center (rendered venue)
pub const STATE_FARM_CALENDAR_LINK: &str = "https://www.statefarmcenter.com/events/all";
pub const STATE_FARM_LOCATION: &str = "State Farm Center 1800 S 1st St, Champaign, IL 61820";
pub const STATE_FARM_TAG: &str = "Entertainment";
pub const STATE_FARM_HOST: &str = "State Farm Center";
pub const VENUE_SHOW_HOURS: i64 = 3;

// Athletics
pub const ATHLETIC_SCHEDULE_LINKS: [&str; 4] = [
    "https://fightingillini.com/sports/football/schedule",
    "https://fightingillini.com/sports/mens-basketball/schedule",
    "https://fightingillini.com/sports/womens-basketball/schedule",
    "https://fightingillini.com/sports/womens-volleyball/schedule",
];
pub const ATHLETICS_TAG: &str = "Athletics";
pub const ATHLETICS_HOST: &str = "Fighting Illini Athletics";
pub const ATHLETICS_HOME_TEAM: &str = "Illinois";
pub const FALLBACK_SPORT: &str = "Sport";
pub const GAME_HOURS: i64 = 3;
pub const FOOTBALL_DEFAULT_START: &str = "11:00 AM";
pub const FOOTBALL_DEFAULT_END: &str = "2:00 PM";
pub const GAME_DEFAULT_START: &str = "7:00 PM";
pub const GAME_DEFAULT_END: &str = "10:00 PM";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

// Output documents
pub const COMBINED_DOCUMENT: &str = "events";
pub const AUDIT_FILE: &str = "last_scraped.txt";
