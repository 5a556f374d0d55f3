use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::info;

use crate::collect::{fetch_bytes, http_client};
use crate::error::{Error, Result};

const IBGE_LOCALIDADES_URL: &str = "https://servicodados.ibge.gov.br/api/v1/localidades";

/// One municipality attribute row
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MunicipalityRow {
    pub code_muni: u32,
    pub name_muni: String,
    pub code_state: u32,
    pub abbrev_state: String,
    pub name_state: String,
    pub code_region: u32,
    pub name_region: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MunicipioResponse {
    One(Municipio),
    Many(Vec<Municipio>),
}

#[derive(Debug, Deserialize)]
struct Municipio {
    id: u32,
    nome: String,
    microrregiao: Option<Microrregiao>,
    #[serde(rename = "regiao-imediata")]
    regiao_imediata: Option<RegiaoImediata>,
}

#[derive(Debug, Deserialize)]
struct Microrregiao {
    mesorregiao: Mesorregiao,
}

#[derive(Debug, Deserialize)]
struct Mesorregiao {
    #[serde(rename = "UF")]
    uf: Uf,
}

#[derive(Debug, Deserialize)]
struct RegiaoImediata {
    #[serde(rename = "regiao-intermediaria")]
    regiao_intermediaria: RegiaoIntermediaria,
}

#[derive(Debug, Deserialize)]
struct RegiaoIntermediaria {
    #[serde(rename = "UF")]
    uf: Uf,
}

#[derive(Debug, Deserialize)]
struct Uf {
    id: u32,
    sigla: String,
    nome: String,
    regiao: Regiao,
}

#[derive(Debug, Deserialize)]
struct Regiao {
    id: u32,
    nome: String,
}

impl Municipio {
    fn into_row(self) -> Result<MunicipalityRow> {
        let uf = match (self.microrregiao, self.regiao_imediata) {
            (Some(micro), _) => micro.mesorregiao.uf,
            (None, Some(imediata)) => imediata.regiao_intermediaria.uf,
            (None, None) => {
                return Err(Error::fetch(format!(
                    "Municipality {} has no state information",
                    self.id
                )))
            }
        };
        Ok(MunicipalityRow {
            code_muni: self.id,
            name_muni: self.nome,
            code_state: uf.id,
            abbrev_state: uf.sigla,
            name_state: uf.nome,
            code_region: uf.regiao.id,
            name_region: uf.regiao.nome,
        })
    }
}

/// Parse an IBGE localities payload (one municipality or a list)
pub fn parse_municipalities(body: &[u8]) -> Result<Vec<MunicipalityRow>> {
    let response: MunicipioResponse = serde_json::from_slice(body)
        .map_err(|e| Error::fetch(format!("Failed to parse IBGE response: {}", e)))?;
    let municipios = match response {
        MunicipioResponse::One(m) => vec![m],
        MunicipioResponse::Many(list) => list,
    };
    municipios.into_iter().map(Municipio::into_row).collect()
}

/// Source of municipality attribute rows
pub trait MunicipalitySource {
    fn read_municipality(&self, code: u32) -> Result<Vec<MunicipalityRow>>;
}

/// Client for the IBGE localities API.
///
/// A 7-digit code selects one municipality, a 2-digit code every
/// municipality of that state.
pub struct IbgeCollect {
    client: Client,
    base_url: String,
}

impl IbgeCollect {
    pub fn new() -> Result<Self> {
        Ok(IbgeCollect {
            client: http_client(30)?,
            base_url: IBGE_LOCALIDADES_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn municipality_url(&self, code: u32) -> Result<String> {
        match code.to_string().len() {
            7 => Ok(format!("{}/municipios/{}", self.base_url, code)),
            2 => Ok(format!("{}/estados/{}/municipios", self.base_url, code)),
            _ => Err(Error::format(format!(
                "Municipality code must have 7 digits (or 2 for a state), got {}",
                code
            ))),
        }
    }
}

impl MunicipalitySource for IbgeCollect {
    fn read_municipality(&self, code: u32) -> Result<Vec<MunicipalityRow>> {
        let url = self.municipality_url(code)?;
        let body = fetch_bytes(&self.client, &url)?;
        let rows = parse_municipalities(&body)?;
        info!(code, rows = rows.len(), "Municipalities loaded from IBGE");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALTA_FLORESTA: &str = r#"{
        "id": 1100015,
        "nome": "Alta Floresta D'Oeste",
        "microrregiao": {
            "id": 11006,
            "nome": "Cacoal",
            "mesorregiao": {
                "id": 1102,
                "nome": "Leste Rondoniense",
                "UF": {
                    "id": 11,
                    "sigla": "RO",
                    "nome": "Rondônia",
                    "regiao": {"id": 1, "sigla": "N", "nome": "Norte"}
                }
            }
        },
        "regiao-imediata": null
    }"#;

    #[test]
    fn test_parse_single() {
        let rows = parse_municipalities(ALTA_FLORESTA.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code_muni, 1100015);
        assert_eq!(rows[0].abbrev_state, "RO");
        assert_eq!(rows[0].name_region, "Norte");
    }

    #[test]
    fn test_parse_list_with_fallback_region() {
        let body = r#"[{
            "id": 1100023,
            "nome": "Ariquemes",
            "microrregiao": null,
            "regiao-imediata": {
                "id": 110002,
                "nome": "Ariquemes",
                "regiao-intermediaria": {
                    "id": 1101,
                    "nome": "Porto Velho",
                    "UF": {
                        "id": 11,
                        "sigla": "RO",
                        "nome": "Rondônia",
                        "regiao": {"id": 1, "sigla": "N", "nome": "Norte"}
                    }
                }
            }
        }]"#;
        let rows = parse_municipalities(body.as_bytes()).unwrap();
        assert_eq!(rows[0].name_muni, "Ariquemes");
        assert_eq!(rows[0].code_state, 11);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_municipalities(b"<html>"),
            Err(Error::Fetch(_))
        ));
    }

    #[test]
    fn test_municipality_url() {
        let ibge = IbgeCollect::new().unwrap().with_base_url("http://localhost/api/");
        assert_eq!(
            ibge.municipality_url(1100015).unwrap(),
            "http://localhost/api/municipios/1100015"
        );
        assert_eq!(
            ibge.municipality_url(11).unwrap(),
            "http://localhost/api/estados/11/municipios"
        );
        assert!(ibge.municipality_url(123).is_err());
    }
}
