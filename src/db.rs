use std::path::Path;

use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::model::{FlightOffer, SearchContext};

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS page_runs (
            id              INTEGER PRIMARY KEY,
            origin          TEXT NOT NULL,
            destination     TEXT NOT NULL,
            departure_date  TEXT NOT NULL,
            return_date     TEXT,
            accessed_at     TEXT NOT NULL,
            status          TEXT NOT NULL CHECK(status IN ('ok','no_offers','anchor_not_found','fetch_error')),
            segments        INTEGER NOT NULL DEFAULT 0,
            expected_offers INTEGER,
            offers_saved    INTEGER NOT NULL DEFAULT 0,
            offers_dropped  INTEGER NOT NULL DEFAULT 0,
            unclassified    INTEGER NOT NULL DEFAULT 0,
            error           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_route ON page_runs(origin, destination);

        CREATE TABLE IF NOT EXISTS offers (
            id                INTEGER PRIMARY KEY,
            run_id            INTEGER NOT NULL REFERENCES page_runs(id),
            departure         TEXT NOT NULL,
            arrival           TEXT NOT NULL,
            airlines          TEXT NOT NULL,
            travel_minutes    INTEGER NOT NULL,
            origin            TEXT NOT NULL,
            destination       TEXT NOT NULL,
            stop_count        INTEGER NOT NULL,
            layover_minutes   INTEGER,
            layover_locations TEXT NOT NULL,
            price             INTEGER,
            price_trend       TEXT NOT NULL,
            price_trend_amount INTEGER,
            accessed_at       TEXT NOT NULL,
            round_trip        BOOLEAN NOT NULL,
            has_train         BOOLEAN NOT NULL,
            days_in_advance   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_offers_route ON offers(origin, destination);
        ",
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Ok,
    NoOffers,
    AnchorNotFound,
    FetchError,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Ok => "ok",
            PageStatus::NoOffers => "no_offers",
            PageStatus::AnchorNotFound => "anchor_not_found",
            PageStatus::FetchError => "fetch_error",
        }
    }
}

/// One fetched (or attempted) page and whatever came out of it.
pub struct PageRow {
    pub ctx: SearchContext,
    pub accessed_at: NaiveDateTime,
    pub status: PageStatus,
    pub segments: usize,
    pub expected_offers: Option<usize>,
    pub offers: Vec<FlightOffer>,
    pub dropped: usize,
    pub unclassified: usize,
    pub error: Option<String>,
}

impl PageRow {
    pub fn failed(ctx: SearchContext, accessed_at: NaiveDateTime, status: PageStatus, error: String) -> Self {
        PageRow {
            ctx,
            accessed_at,
            status,
            segments: 0,
            expected_offers: None,
            offers: Vec::new(),
            dropped: 0,
            unclassified: 0,
            error: Some(error),
        }
    }
}

/// Write a batch of pages and their offers in one transaction.
/// Returns the number of offers inserted.
pub fn save_pages(conn: &Connection, pages: &[PageRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut run_stmt = tx.prepare(
            "INSERT INTO page_runs
             (origin, destination, departure_date, return_date, accessed_at, status,
              segments, expected_offers, offers_saved, offers_dropped, unclassified, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        let mut offer_stmt = tx.prepare(
            "INSERT INTO offers
             (run_id, departure, arrival, airlines, travel_minutes, origin, destination,
              stop_count, layover_minutes, layover_locations, price, price_trend,
              price_trend_amount, accessed_at, round_trip, has_train, days_in_advance)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        )?;
        for p in pages {
            run_stmt.execute(rusqlite::params![
                p.ctx.origin,
                p.ctx.destination,
                p.ctx.departure_date.to_string(),
                p.ctx.return_date.map(|d| d.to_string()),
                p.accessed_at.format(TS_FORMAT).to_string(),
                p.status.as_str(),
                p.segments,
                p.expected_offers,
                p.offers.len(),
                p.dropped,
                p.unclassified,
                p.error,
            ])?;
            let run_id = tx.last_insert_rowid();

            for o in &p.offers {
                offer_stmt.execute(rusqlite::params![
                    run_id,
                    o.departure.format(TS_FORMAT).to_string(),
                    o.arrival.format(TS_FORMAT).to_string(),
                    serde_json::to_string(&o.airlines)?,
                    o.travel_minutes,
                    o.origin,
                    o.destination,
                    o.stop_count,
                    o.layover_minutes,
                    serde_json::to_string(&o.layover_locations)?,
                    o.price,
                    o.price_trend.trend.as_str(),
                    o.price_trend.amount,
                    o.accessed_at.format(TS_FORMAT).to_string(),
                    o.round_trip,
                    o.has_train,
                    o.days_in_advance,
                ])?;
                count += 1;
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Stats ──

pub struct Stats {
    pub pages: usize,
    pub pages_ok: usize,
    pub pages_no_offers: usize,
    pub pages_failed: usize,
    pub offers: usize,
    pub dropped: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count_status = |status: &str| -> rusqlite::Result<usize> {
        conn.query_row(
            "SELECT COUNT(*) FROM page_runs WHERE status = ?1",
            [status],
            |r| r.get(0),
        )
    };
    let pages: usize = conn.query_row("SELECT COUNT(*) FROM page_runs", [], |r| r.get(0))?;
    let pages_ok = count_status(PageStatus::Ok.as_str())?;
    let pages_no_offers = count_status(PageStatus::NoOffers.as_str())?;
    let offers: usize = conn.query_row("SELECT COUNT(*) FROM offers", [], |r| r.get(0))?;
    let dropped: usize = conn.query_row(
        "SELECT COALESCE(SUM(offers_dropped), 0) FROM page_runs",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        pages,
        pages_ok,
        pages_no_offers,
        pages_failed: pages - pages_ok - pages_no_offers,
        offers,
        dropped,
    })
}

pub struct RouteStats {
    pub origin: String,
    pub destination: String,
    pub offers: usize,
    pub avg_price: Option<f64>,
    pub min_price: Option<u32>,
    pub avg_travel_minutes: u32,
}

pub fn route_stats(conn: &Connection) -> Result<Vec<RouteStats>> {
    let mut stmt = conn.prepare(
        "SELECT origin, destination, COUNT(*), AVG(price), MIN(price),
                CAST(ROUND(AVG(travel_minutes)) AS INTEGER)
         FROM offers
         GROUP BY origin, destination
         ORDER BY origin, destination",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RouteStats {
                origin: row.get(0)?,
                destination: row.get(1)?,
                offers: row.get(2)?,
                avg_price: row.get(3)?,
                min_price: row.get(4)?,
                avg_travel_minutes: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct CheapestRow {
    pub origin: String,
    pub destination: String,
    pub departure: String,
    pub airlines: Vec<String>,
    pub price: u32,
}

pub fn cheapest_offer(conn: &Connection) -> Result<Option<CheapestRow>> {
    let mut stmt = conn.prepare(
        "SELECT origin, destination, departure, airlines, price
         FROM offers
         WHERE price IS NOT NULL
         ORDER BY price, departure
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, u32>(4)?,
        ))
    })?;
    match rows.next() {
        Some(r) => {
            let (origin, destination, departure, airlines, price) = r?;
            Ok(Some(CheapestRow {
                origin,
                destination,
                departure,
                airlines: serde_json::from_str(&airlines)?,
                price,
            }))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceTrend;
    use chrono::NaiveDate;

    fn ts(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn ctx() -> SearchContext {
        SearchContext::one_way("MUC", "FCO", NaiveDate::from_ymd_opt(2024, 3, 25).unwrap())
    }

    fn offer(price: Option<u32>, airline: &str) -> FlightOffer {
        FlightOffer {
            departure: ts(25, 10),
            arrival: ts(25, 12),
            airlines: vec![airline.to_string()],
            travel_minutes: 120,
            origin: "MUC".into(),
            destination: "FCO".into(),
            stop_count: 1,
            layover_minutes: Some(45),
            layover_locations: vec!["FRA".into()],
            price,
            price_trend: PriceTrend::UNKNOWN,
            accessed_at: ts(20, 8),
            round_trip: false,
            has_train: false,
            days_in_advance: 5,
        }
    }

    fn open() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flights.sqlite");
        let conn = connect(path.to_str().unwrap()).unwrap();
        init_schema(&conn).unwrap();
        (dir, conn)
    }

    fn ok_page(offers: Vec<FlightOffer>) -> PageRow {
        PageRow {
            ctx: ctx(),
            accessed_at: ts(20, 8),
            status: PageStatus::Ok,
            segments: offers.len() + 1,
            expected_offers: Some(offers.len() + 1),
            offers,
            dropped: 1,
            unclassified: 2,
            error: None,
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let (_dir, conn) = open();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn saves_offers_and_runs() {
        let (_dir, conn) = open();
        let pages = vec![
            ok_page(vec![offer(Some(129), "Lufthansa"), offer(Some(89), "ITA"), offer(None, "Condor")]),
            PageRow::failed(ctx(), ts(20, 8), PageStatus::FetchError, "timeout".into()),
            PageRow {
                status: PageStatus::NoOffers,
                dropped: 0,
                ..ok_page(Vec::new())
            },
        ];
        assert_eq!(save_pages(&conn, &pages).unwrap(), 3);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.pages, 3);
        assert_eq!(s.pages_ok, 1);
        assert_eq!(s.pages_no_offers, 1);
        assert_eq!(s.pages_failed, 1);
        assert_eq!(s.offers, 3);
        assert_eq!(s.dropped, 1);
    }

    #[test]
    fn lists_stored_as_json() {
        let (_dir, conn) = open();
        save_pages(&conn, &[ok_page(vec![offer(Some(129), "Lufthansa")])]).unwrap();
        let (airlines, layovers, departure): (String, String, String) = conn
            .query_row(
                "SELECT airlines, layover_locations, departure FROM offers",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(airlines, r#"["Lufthansa"]"#);
        assert_eq!(layovers, r#"["FRA"]"#);
        assert_eq!(departure, "2024-03-25T10:00:00");
    }

    #[test]
    fn route_stats_and_cheapest() {
        let (_dir, conn) = open();
        save_pages(
            &conn,
            &[ok_page(vec![offer(Some(129), "Lufthansa"), offer(Some(89), "ITA"), offer(None, "Condor")])],
        )
        .unwrap();

        let routes = route_stats(&conn).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].offers, 3);
        assert_eq!(routes[0].min_price, Some(89));
        assert_eq!(routes[0].avg_price, Some(109.0));
        assert_eq!(routes[0].avg_travel_minutes, 120);

        let cheapest = cheapest_offer(&conn).unwrap().unwrap();
        assert_eq!(cheapest.price, 89);
        assert_eq!(cheapest.airlines, ["ITA"]);
    }

    #[test]
    fn empty_database() {
        let (_dir, conn) = open();
        assert!(cheapest_offer(&conn).unwrap().is_none());
        assert!(route_stats(&conn).unwrap().is_empty());
        assert_eq!(get_stats(&conn).unwrap().pages, 0);
    }
}
