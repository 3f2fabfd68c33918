use db::{
    cooking::{Ingredient, Recipe},
    users::User,
};

use crate::{state::VersionInfo, Result};

pub(crate) async fn print_info() -> Result<()> {
    let versions = VersionInfo::from_env();
    println!("{} {}", versions.name, versions.version);

    let pool = db::setup_db_pool().await?;

    println!("Users:       {}", User::count(&pool).await?);
    println!("Recipes:     {}", Recipe::count(&pool).await?);
    println!("Ingredients: {}", Ingredient::count(&pool).await?);

    Ok(())
}
