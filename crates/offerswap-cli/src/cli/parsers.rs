use offerswap_core::DecisionAction;

pub(super) fn parse_action(raw: &str) -> std::result::Result<DecisionAction, String> {
    DecisionAction::parse(raw)
        .ok_or_else(|| format!("invalid action '{raw}' (expected replace|skip|remove)"))
}

pub(super) fn parse_min_one_usize(raw: &str) -> std::result::Result<usize, String> {
    let value = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid integer value '{raw}'"))?;
    if value == 0 {
        return Err("value must be >= 1".to_string());
    }
    Ok(value)
}
