//! Expense profile storage

use super::DbResult;
use parts_common::{ExpenseProfile, TransferMethod};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const PROFILE_COLUMNS: &str = "id, name, is_default, low_weight_delivery_fee, transfer_method,
     eur_rub_rate, eur_usdt_rate, usdt_rub_rate, commission_ip, commission_crypto,
     commission_agent, domestic_delivery_fee, vat_percent, profit_tax_percent,
     document_cost_percent, target_official_profit, competitor_price_min, competitor_price_max";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ExpenseProfile> {
    let method: String = row.get(4)?;
    Ok(ExpenseProfile {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        is_default: row.get(2)?,
        low_weight_delivery_fee: row.get(3)?,
        transfer_method: TransferMethod::parse(&method),
        eur_rub_rate: row.get(5)?,
        eur_usdt_rate: row.get(6)?,
        usdt_rub_rate: row.get(7)?,
        commission_ip: row.get(8)?,
        commission_crypto: row.get(9)?,
        commission_agent: row.get(10)?,
        domestic_delivery_fee: row.get(11)?,
        vat_percent: row.get(12)?,
        profit_tax_percent: row.get(13)?,
        document_cost_percent: row.get(14)?,
        target_official_profit: row.get(15)?,
        competitor_price_min: row.get(16)?,
        competitor_price_max: row.get(17)?,
    })
}

/// Store a profile and return its id
///
/// A profile flagged as default takes the flag away from every other
/// profile in the same transaction.
pub fn insert_profile(conn: &mut Connection, profile: &ExpenseProfile) -> DbResult<i64> {
    let tx = conn.transaction()?;
    if profile.is_default {
        clear_default(&tx)?;
    }
    tx.execute(
        "INSERT INTO expense_profiles
         (name, is_default, low_weight_delivery_fee, transfer_method, eur_rub_rate,
          eur_usdt_rate, usdt_rub_rate, commission_ip, commission_crypto, commission_agent,
          domestic_delivery_fee, vat_percent, profit_tax_percent, document_cost_percent,
          target_official_profit, competitor_price_min, competitor_price_max)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            &profile.name,
            profile.is_default,
            profile.low_weight_delivery_fee,
            profile.transfer_method.as_str(),
            profile.eur_rub_rate,
            profile.eur_usdt_rate,
            profile.usdt_rub_rate,
            profile.commission_ip,
            profile.commission_crypto,
            profile.commission_agent,
            profile.domestic_delivery_fee,
            profile.vat_percent,
            profile.profit_tax_percent,
            profile.document_cost_percent,
            profile.target_official_profit,
            profile.competitor_price_min,
            profile.competitor_price_max,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    log::info!("Stored expense profile '{}' (id {})", profile.name, id);
    Ok(id)
}

fn clear_default(tx: &Transaction<'_>) -> DbResult<()> {
    tx.execute(
        "UPDATE expense_profiles SET is_default = 0 WHERE is_default = 1",
        [],
    )?;
    Ok(())
}

/// Make `id` the only default profile; false if no such profile exists
pub fn set_default_profile(conn: &mut Connection, id: i64) -> DbResult<bool> {
    let tx = conn.transaction()?;
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM expense_profiles WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(false);
    }

    clear_default(&tx)?;
    tx.execute(
        "UPDATE expense_profiles SET is_default = 1 WHERE id = ?1",
        params![id],
    )?;
    tx.commit()?;
    Ok(true)
}

/// The default (active) profile, if one is configured
pub fn get_default_profile(conn: &Connection) -> DbResult<Option<ExpenseProfile>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM expense_profiles WHERE is_default = 1 LIMIT 1",
            PROFILE_COLUMNS
        ),
        [],
        profile_from_row,
    )
    .optional()
}

pub fn get_profile(conn: &Connection, id: i64) -> DbResult<Option<ExpenseProfile>> {
    conn.query_row(
        &format!("SELECT {} FROM expense_profiles WHERE id = ?1", PROFILE_COLUMNS),
        params![id],
        profile_from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::test_db;

    /// Cash profile matching the reference pricing example
    pub fn make_test_profile(name: &str, is_default: bool) -> ExpenseProfile {
        ExpenseProfile {
            id: None,
            name: name.to_string(),
            is_default,
            low_weight_delivery_fee: 5.0,
            transfer_method: TransferMethod::Cash,
            eur_rub_rate: 100.0,
            eur_usdt_rate: 1.08,
            usdt_rub_rate: 95.0,
            commission_ip: 2.0,
            commission_crypto: 3.0,
            commission_agent: 500.0,
            domestic_delivery_fee: 200.0,
            vat_percent: 20.0,
            profit_tax_percent: 20.0,
            document_cost_percent: 5.0,
            target_official_profit: 30.0,
            competitor_price_min: 0.0,
            competitor_price_max: 0.0,
        }
    }

    fn default_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM expense_profiles WHERE is_default = 1",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn insert_and_read_back() {
        let mut conn = test_db();
        let mut profile = make_test_profile("Cash", true);
        profile.transfer_method = TransferMethod::Crypto;
        profile.competitor_price_max = 3100.0;

        let id = insert_profile(&mut conn, &profile).unwrap();
        let stored = get_profile(&conn, id).unwrap().unwrap();

        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.name, "Cash");
        assert_eq!(stored.transfer_method, TransferMethod::Crypto);
        assert_eq!(stored.competitor_price_max, 3100.0);
        assert!(stored.is_default);
    }

    #[test]
    fn no_default_profile() {
        let mut conn = test_db();
        insert_profile(&mut conn, &make_test_profile("Draft", false)).unwrap();
        assert!(get_default_profile(&conn).unwrap().is_none());
    }

    #[test]
    fn new_default_replaces_old_one() {
        let mut conn = test_db();
        insert_profile(&mut conn, &make_test_profile("Old", true)).unwrap();
        insert_profile(&mut conn, &make_test_profile("New", true)).unwrap();

        assert_eq!(default_count(&conn), 1);
        assert_eq!(get_default_profile(&conn).unwrap().unwrap().name, "New");
    }

    #[test]
    fn set_default_moves_flag() {
        let mut conn = test_db();
        let first = insert_profile(&mut conn, &make_test_profile("First", true)).unwrap();
        let second = insert_profile(&mut conn, &make_test_profile("Second", false)).unwrap();

        assert!(set_default_profile(&mut conn, second).unwrap());
        assert_eq!(default_count(&conn), 1);
        assert_eq!(get_default_profile(&conn).unwrap().unwrap().id, Some(second));
        assert!(!get_profile(&conn, first).unwrap().unwrap().is_default);
    }

    #[test]
    fn set_default_unknown_id_keeps_current() {
        let mut conn = test_db();
        let id = insert_profile(&mut conn, &make_test_profile("Only", true)).unwrap();

        assert!(!set_default_profile(&mut conn, 999).unwrap());
        assert_eq!(get_default_profile(&conn).unwrap().unwrap().id, Some(id));
    }

    #[test]
    fn second_default_row_is_rejected_by_schema() {
        let mut conn = test_db();
        insert_profile(&mut conn, &make_test_profile("A", true)).unwrap();
        let result = conn.execute(
            "UPDATE expense_profiles SET is_default = 1 WHERE name = 'B'",
            [],
        );
        // No row named B: nothing changes
        assert_eq!(result.unwrap(), 0);

        insert_profile(&mut conn, &make_test_profile("B", false)).unwrap();
        let result = conn.execute(
            "UPDATE expense_profiles SET is_default = 1 WHERE name = 'B'",
            [],
        );
        assert!(result.is_err());
    }
}

#[cfg(test)]
pub use tests::make_test_profile;
